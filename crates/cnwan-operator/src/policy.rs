use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::{ALLOWED_LABEL, BLOCKED_LABEL};

/// How namespaces enter the watched scope
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListPolicy {
    /// only namespaces labelled as allowed
    AllowList,
    /// every namespace not labelled as blocked
    BlockList,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespacePolicy {
    list_policy: ListPolicy,
    allowed_label: String,
    blocked_label: String,
}

impl NamespacePolicy {
    pub fn new(list_policy: ListPolicy) -> Self {
        Self {
            list_policy,
            allowed_label: ALLOWED_LABEL.to_owned(),
            blocked_label: BLOCKED_LABEL.to_owned(),
        }
    }

    pub fn list_policy(&self) -> ListPolicy {
        self.list_policy
    }

    pub fn should_watch(&self, labels: Option<&BTreeMap<String, String>>) -> bool {
        match self.list_policy {
            ListPolicy::AllowList => labels.is_some_and(|l| l.contains_key(&self.allowed_label)),
            ListPolicy::BlockList => !labels.is_some_and(|l| l.contains_key(&self.blocked_label)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(key: &str) -> BTreeMap<String, String> {
        [(key.to_owned(), "v".to_owned())].into_iter().collect()
    }

    #[test]
    fn test_allow_list() {
        let policy = NamespacePolicy::new(ListPolicy::AllowList);
        assert!(!policy.should_watch(Some(&BTreeMap::new())));
        assert!(!policy.should_watch(None));
        assert!(policy.should_watch(Some(&labels(ALLOWED_LABEL))));
        assert!(!policy.should_watch(Some(&labels(BLOCKED_LABEL))));
    }

    #[test]
    fn test_block_list() {
        let policy = NamespacePolicy::new(ListPolicy::BlockList);
        assert!(policy.should_watch(Some(&BTreeMap::new())));
        assert!(policy.should_watch(None));
        assert!(!policy.should_watch(Some(&labels(BLOCKED_LABEL))));
        assert!(policy.should_watch(Some(&labels(ALLOWED_LABEL))));
    }

    #[test]
    fn test_policy_names() {
        let policy: ListPolicy = serde_yaml::from_str("allowlist").expect("parsed");
        assert_eq!(policy, ListPolicy::AllowList);
        let policy: ListPolicy = serde_yaml::from_str("blocklist").expect("parsed");
        assert_eq!(policy, ListPolicy::BlockList);
    }
}
