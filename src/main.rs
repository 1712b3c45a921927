mod cli;

use std::process;

use clap::Parser;
use directories::ProjectDirs;
use flexi_logger::{
    detailed_format, Cleanup, Criterion, Duplicate, FileSpec, Logger, LoggerHandle, Naming,
};
use log::{debug, error};

use autotest_filetree::config::Config;
use autotest_filetree::{ErrorKind, FileTreeError};
use cli::Cli;

fn main() {
    let args = Cli::parse();

    let Some(project_dirs) = ProjectDirs::from("", "", "filetree") else {
        eprintln!("Could not determine a data directory for filetree");
        process::exit(1);
    };
    let data_dir = project_dirs.data_local_dir().to_path_buf();
    let config = Config::init(&project_dirs);

    // Held until exit so buffered log lines are flushed
    let _logger = match setup_logging(config, &data_dir) {
        Ok(handle) => Some(handle),
        Err(e) => {
            eprintln!("Logging disabled: {}", e);
            None
        }
    };

    debug!("Command-line args: {:?}", std::env::args_os().collect::<Vec<_>>());

    if let Err(err) = args.execute(config, &data_dir) {
        error!("{:?}", err);
        eprintln!("{}", err);
        process::exit(exit_code(&err));
    }
}

/// Log to rotating files in the data directory, with warnings duplicated to stderr.
/// `RUST_LOG` overrides the configured level.
fn setup_logging(config: &Config, data_dir: &std::path::Path) -> Result<LoggerHandle, FileTreeError> {
    let level = &config.logging.filetree;
    let spec = format!("autotest_filetree={level}, filetree={level}");

    Logger::try_with_env_or_str(spec)
        .and_then(|logger| {
            logger
                .log_to_file(
                    FileSpec::default()
                        .directory(data_dir.join("logs"))
                        .basename("filetree"),
                )
                .rotate(
                    Criterion::Size(10 * 1024 * 1024),
                    Naming::Timestamps,
                    Cleanup::KeepLogFiles(7),
                )
                .duplicate_to_stderr(Duplicate::Warn)
                .format_for_files(detailed_format)
                .start()
        })
        .map_err(|e| FileTreeError::Error(format!("Failed to start logger: {}", e)))
}

fn exit_code(err: &FileTreeError) -> i32 {
    match err.kind() {
        ErrorKind::Internal => 1,
        ErrorKind::InvalidArgument => 2,
        ErrorKind::NotFound => 3,
        ErrorKind::AlreadyExists => 4,
        ErrorKind::InvalidState => 5,
    }
}
