use uuid::Uuid;

pub struct Utils {}

impl Utils {
    /// Current UTC time as unix seconds.
    pub fn now_secs() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// Allocate a fresh, globally unique inode. Never collides with the root sentinel.
    pub fn new_inode() -> String {
        Uuid::new_v4().simple().to_string()
    }

    /// Escape `%`, `_` and the escape character itself for use in `LIKE ... ESCAPE '\'`.
    pub fn escape_like(value: &str) -> String {
        let mut escaped = String::with_capacity(value.len());
        for c in value.chars() {
            if matches!(c, '%' | '_' | '\\') {
                escaped.push('\\');
            }
            escaped.push(c);
        }
        escaped
    }

    pub fn char_count(value: &str) -> usize {
        value.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_inode_is_unique_and_not_sentinel() {
        let a = Utils::new_inode();
        let b = Utils::new_inode();
        assert_ne!(a, b);
        assert_ne!(a, "0");
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn test_escape_like() {
        assert_eq!(Utils::escape_like("plain"), "plain");
        assert_eq!(Utils::escape_like("50%_off\\"), "50\\%\\_off\\\\");
    }

    #[test]
    fn test_char_count_counts_scalar_values() {
        assert_eq!(Utils::char_count("用例"), 2);
        assert_eq!(Utils::char_count("case"), 4);
    }
}
