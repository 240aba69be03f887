use crate::service::ServiceError;

/// Checks the presented API key against the single configured secret.
#[derive(Clone)]
pub struct Authenticator {
    expected: String,
}

impl std::fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authenticator").finish_non_exhaustive()
    }
}

impl Authenticator {
    pub fn new(expected: impl Into<String>) -> Self {
        Self { expected: expected.into() }
    }

    /// A missing header counts as an empty key.
    pub fn verify(&self, presented: Option<&str>) -> Result<(), ServiceError> {
        let presented = presented.unwrap_or("");
        if !self.expected.is_empty() && constant_time_eq(presented.as_bytes(), self.expected.as_bytes()) {
            Ok(())
        } else {
            Err(ServiceError::Unauthorized)
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify() {
        let auth = Authenticator::new("secret-key");
        assert_eq!(auth.verify(Some("secret-key")), Ok(()));
        assert_eq!(auth.verify(Some("secret-kez")), Err(ServiceError::Unauthorized));
        assert_eq!(auth.verify(Some("secret")), Err(ServiceError::Unauthorized));
        assert_eq!(auth.verify(None), Err(ServiceError::Unauthorized));
        assert_eq!(auth.verify(Some("")), Err(ServiceError::Unauthorized));
    }

    #[test]
    fn test_empty_secret_accepts_nothing() {
        let auth = Authenticator::new("");
        assert_eq!(auth.verify(None), Err(ServiceError::Unauthorized));
        assert_eq!(auth.verify(Some("")), Err(ServiceError::Unauthorized));
    }

    #[test]
    fn test_debug_hides_secret() {
        let auth = Authenticator::new("secret-key");
        assert!(!format!("{:?}", auth).contains("secret-key"));
    }
}
