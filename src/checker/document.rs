use crate::error::AppError;
use serde_yaml::Value;

/// An ordered proxy-configuration document: at minimum a `proxies` sequence,
/// optionally a `proxy-groups` sequence whose members reference proxy or
/// group names by exact string.
///
/// Wraps a `serde_yaml::Mapping` rather than a typed struct so that unknown
/// top-level keys (rules, DNS blocks, whatever the subscription author
/// included) round-trip untouched — the checker only ever needs to read and
/// rewrite `proxies`/`proxy-groups`.
pub struct ConfigDocument {
    root: serde_yaml::Mapping,
}

impl ConfigDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self, AppError> {
        let value: Value = serde_yaml::from_slice(bytes)?;
        let Value::Mapping(root) = value else {
            return Err(AppError::InvalidContent(
                "top-level document is not a mapping".to_string(),
            ));
        };

        match root.get("proxies") {
            Some(Value::Sequence(_)) => {}
            _ => {
                return Err(AppError::InvalidContent(
                    "document has no 'proxies' sequence".to_string(),
                ))
            }
        }

        Ok(Self { root })
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, AppError> {
        Ok(serde_yaml::to_string(&Value::Mapping(self.root.clone()))?.into_bytes())
    }

    pub fn proxy_count(&self) -> usize {
        self.proxies().map(|p| p.len()).unwrap_or(0)
    }

    pub fn proxy_name(&self, index: usize) -> Option<String> {
        self.proxies()?
            .get(index)?
            .as_mapping()?
            .get("name")?
            .as_str()
            .map(str::to_string)
    }

    /// Rename the proxy at `index` to `new_name`, rewriting every matching
    /// occurrence in every group's `proxies` list in the same call — the two
    /// rewrites are a single logical update.
    ///
    /// Returns the proxy's previous name, or `None` if `index` is out of
    /// range or the proxy entry isn't a mapping with a `name` field.
    pub fn rename_proxy(&mut self, index: usize, new_name: &str) -> Option<String> {
        let old_name = self.proxy_name(index)?;

        let proxies = self.root.get_mut("proxies")?.as_sequence_mut()?;
        let entry = proxies.get_mut(index)?.as_mapping_mut()?;
        entry.insert(
            Value::String("name".to_string()),
            Value::String(new_name.to_string()),
        );

        self.rewrite_group_references(&old_name, new_name);

        Some(old_name)
    }

    fn rewrite_group_references(&mut self, old_name: &str, new_name: &str) {
        let Some(Value::Sequence(groups)) = self.root.get_mut("proxy-groups") else {
            return;
        };

        for group in groups.iter_mut() {
            let Some(group) = group.as_mapping_mut() else {
                continue;
            };
            let Some(Value::Sequence(members)) = group.get_mut("proxies") else {
                continue;
            };
            for member in members.iter_mut() {
                if member.as_str() == Some(old_name) {
                    *member = Value::String(new_name.to_string());
                }
            }
        }
    }

    fn proxies(&self) -> Option<&Vec<Value>> {
        self.root.get("proxies")?.as_sequence()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rejects_non_mapping() {
        assert!(ConfigDocument::parse(b"- 1\n- 2\n").is_err());
    }

    #[test]
    fn parse_rejects_missing_proxies() {
        assert!(ConfigDocument::parse(b"rules: []\n").is_err());
    }

    #[test]
    fn parse_accepts_minimal_document() {
        let doc = ConfigDocument::parse(b"proxies: []\n").unwrap();
        assert_eq!(doc.proxy_count(), 0);
    }

    #[test]
    fn rename_updates_proxy_and_group_reference() {
        let yaml = b"
proxies:
  - name: A
    type: ss
  - name: B
    type: ss
proxy-groups:
  - name: G
    proxies: [A, B, REJECT]
";
        let mut doc = ConfigDocument::parse(yaml).unwrap();
        let old = doc.rename_proxy(0, "A 【⚪ 住宅|原生】").unwrap();
        assert_eq!(old, "A");

        let rendered = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        let reparsed: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();
        let groups = reparsed["proxy-groups"][0]["proxies"].as_sequence().unwrap();
        let names: Vec<&str> = groups.iter().map(|v| v.as_str().unwrap()).collect();
        assert_eq!(names, vec!["A 【⚪ 住宅|原生】", "B", "REJECT"]);
        assert_eq!(reparsed["proxies"][0]["name"].as_str().unwrap(), "A 【⚪ 住宅|原生】");
    }

    #[test]
    fn proxy_ordering_is_preserved() {
        let yaml = b"
proxies:
  - name: A
  - name: B
  - name: C
";
        let doc = ConfigDocument::parse(yaml).unwrap();
        assert_eq!(doc.proxy_name(0).unwrap(), "A");
        assert_eq!(doc.proxy_name(1).unwrap(), "B");
        assert_eq!(doc.proxy_name(2).unwrap(), "C");
    }

    #[test]
    fn cyclic_group_reference_is_left_untouched_by_exact_match() {
        let yaml = b"
proxies:
  - name: A
proxy-groups:
  - name: G1
    proxies: [G2, A]
  - name: G2
    proxies: [G1]
";
        let mut doc = ConfigDocument::parse(yaml).unwrap();
        doc.rename_proxy(0, "A-tagged").unwrap();
        let rendered = String::from_utf8(doc.to_bytes().unwrap()).unwrap();
        let reparsed: serde_yaml::Value = serde_yaml::from_str(&rendered).unwrap();
        let g1 = reparsed["proxy-groups"][0]["proxies"].as_sequence().unwrap();
        let names: Vec<&str> = g1.iter().map(|v| v.as_str().unwrap()).collect();
        assert_eq!(names, vec!["G2", "A-tagged"]);
    }
}
