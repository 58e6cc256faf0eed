//! Record key generation and handling.

/// A key that uniquely identifies one rate limit budget.
///
/// Budgets are partitioned by policy name and caller identity, so the same
/// identity holds independent counts under different policies.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    /// The policy this budget belongs to
    pub policy: String,
    /// The caller identity (network address or principal)
    pub identity: String,
}

impl RecordKey {
    /// Create a new record key from a policy name and identity.
    pub fn new(policy: &str, identity: &str) -> Self {
        Self {
            policy: policy.to_string(),
            identity: identity.to_string(),
        }
    }
}

impl std::fmt::Display for RecordKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.policy, self.identity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_key_display() {
        let key = RecordKey::new("login", "1.2.3.4");
        assert_eq!(key.to_string(), "login:1.2.3.4");
    }

    #[test]
    fn test_record_key_equality() {
        let key1 = RecordKey::new("login", "1.2.3.4");
        let key2 = RecordKey::new("login", "1.2.3.4");
        assert_eq!(key1, key2);
    }

    #[test]
    fn test_record_key_distinct_policies() {
        let key1 = RecordKey::new("login", "1.2.3.4");
        let key2 = RecordKey::new("search", "1.2.3.4");
        assert_ne!(key1, key2);
    }
}
