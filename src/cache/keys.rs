use std::time::Duration;

pub const SESSION_TTL: Duration = Duration::from_secs(10 * 60);

pub fn session_key(token_hash: &str) -> String {
    format!("lingo:session:{}", token_hash)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_key_is_namespaced() {
        assert_eq!(session_key("abc"), "lingo:session:abc");
    }
}
