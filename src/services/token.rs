use crate::portal::{Identity, Result};
use uuid::Uuid;

/// Create a new random session token
///
/// The token is the 32 character hex form of a v4 uuid, which is exactly the
/// capacity of a token identity.
pub fn new_session_token() -> Result<Identity> {
    Identity::token(Uuid::new_v4().simple().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::portal::session::TOKEN_MAX_LEN;

    #[test]
    fn tokens_fill_capacity_and_differ() {
        let first = new_session_token().expect("valid token");
        let second = new_session_token().expect("valid token");

        assert_eq!(first.as_str().len(), TOKEN_MAX_LEN);
        assert!(first.as_str().chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!first.is_address());
        assert_ne!(first, second);
    }
}
