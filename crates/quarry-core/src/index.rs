//! In-memory index collection.
//!
//! An [`Index`] holds at most one [`Specification`] per identity
//! `(name, version, platform)`, kept sorted by identity order. Selection
//! helpers produce the entries of the three aggregate indices.

use quarry_schema::{SpecTuple, Specification, Version, platform};

#[derive(Debug, Clone)]
struct Entry {
    key: SpecTuple,
    spec: Specification,
}

/// Sorted, deduplicated set of specifications.
#[derive(Debug, Clone, Default)]
pub struct Index {
    entries: Vec<Entry>,
}

impl Index {
    /// An empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the specification with the same identity.
    ///
    /// Returns the replaced specification, if any.
    pub fn insert(&mut self, spec: Specification) -> Option<Specification> {
        let key = spec.to_tuple();
        match self.entries.binary_search_by(|e| e.key.cmp(&key)) {
            Ok(idx) => Some(std::mem::replace(&mut self.entries[idx].spec, spec)),
            Err(idx) => {
                self.entries.insert(idx, Entry { key, spec });
                None
            }
        }
    }

    /// Number of specifications.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the index holds nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All specifications in identity order.
    pub fn iter(&self) -> impl Iterator<Item = &Specification> {
        self.entries.iter().map(|e| &e.spec)
    }

    /// All identities in order.
    pub fn tuples(&self) -> impl Iterator<Item = &SpecTuple> {
        self.entries.iter().map(|e| &e.key)
    }

    /// Specification with exactly this identity.
    pub fn get(&self, tuple: &SpecTuple) -> Option<&Specification> {
        self.entries
            .binary_search_by(|e| e.key.cmp(tuple))
            .ok()
            .map(|idx| &self.entries[idx].spec)
    }

    /// Whether a specification with this identity is present.
    pub fn contains(&self, tuple: &SpecTuple) -> bool {
        self.get(tuple).is_some()
    }

    /// Re-sort the collection. Insertion already keeps it ordered; the stable
    /// sort makes emission independent of how entries arrived.
    pub fn finalize(&mut self) {
        self.entries.sort_by(|a, b| a.key.cmp(&b.key));
        self.entries.dedup_by(|a, b| a.key == b.key);
    }

    /// Every non-prerelease specification.
    pub fn released(&self) -> impl Iterator<Item = &Specification> {
        self.iter().filter(|s| !s.is_prerelease())
    }

    /// Every prerelease specification.
    pub fn prereleases(&self) -> impl Iterator<Item = &Specification> {
        self.iter().filter(|s| s.is_prerelease())
    }

    /// The newest released specification of each name.
    ///
    /// Names with only prereleases are absent. When several platforms share
    /// the newest version, the one last in identity order wins.
    pub fn latest(&self) -> Vec<&Specification> {
        let mut latest: Vec<&Specification> = Vec::new();
        for spec in self.released() {
            match latest.last_mut() {
                Some(last) if last.name() == spec.name() => *last = spec,
                _ => latest.push(spec),
            }
        }
        latest
    }

    /// Find a specification by name.
    ///
    /// `platform` of `None` means generic. Without a version the newest
    /// released version for that platform is returned.
    pub fn find(
        &self,
        name: &str,
        version: Option<&Version>,
        platform: Option<&str>,
    ) -> Option<&Specification> {
        let wanted = platform::normalize(platform);
        let mut candidates = self
            .iter()
            .filter(|s| s.name() == name && s.platform() == wanted.as_deref());

        match version {
            Some(v) => candidates.find(|s| s.version() == v),
            None => candidates.filter(|s| !s.is_prerelease()).last(),
        }
    }
}

impl Extend<Specification> for Index {
    fn extend<I: IntoIterator<Item = Specification>>(&mut self, iter: I) {
        for spec in iter {
            self.insert(spec);
        }
    }
}

impl FromIterator<Specification> for Index {
    fn from_iter<I: IntoIterator<Item = Specification>>(iter: I) -> Self {
        let mut index = Index::new();
        index.extend(iter);
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str, version: &str, platform: Option<&str>) -> Specification {
        Specification::new(name, Version::parse(version).unwrap(), platform).unwrap()
    }

    fn basenames<'a>(specs: impl IntoIterator<Item = &'a Specification>) -> Vec<String> {
        specs.into_iter().map(|s| s.basename().to_string()).collect()
    }

    #[test]
    fn insert_keeps_identity_unique_and_sorted() {
        let mut index = Index::new();
        index.insert(spec("json", "1.2.3", Some("java")));
        index.insert(spec("json", "1.2.3", None));
        index.insert(spec("activesupport", "7.0", None));

        let mut again = spec("json", "1.2.3", None);
        again.summary = Some("replacement".into());
        let replaced = index.insert(again);

        assert!(replaced.is_some());
        assert_eq!(index.len(), 3);
        assert_eq!(
            basenames(index.iter()),
            vec!["activesupport-7.0", "json-1.2.3", "json-1.2.3-java"]
        );
        let json = index.get(&spec("json", "1.2.3", None).to_tuple()).unwrap();
        assert_eq!(json.summary.as_deref(), Some("replacement"));
    }

    #[test]
    fn equal_versions_with_different_text_are_one_identity() {
        let mut index = Index::new();
        index.insert(spec("rake", "1.0", None));
        index.insert(spec("rake", "1.0.0", None));
        assert_eq!(index.len(), 1);
    }

    #[test]
    fn selection_splits_released_latest_and_prerelease() {
        let index: Index = [
            spec("foo", "1.0", None),
            spec("foo", "2.0.pre", None),
            spec("foo", "1.1", None),
            spec("bar", "0.1.a", None),
        ]
        .into_iter()
        .collect();

        assert_eq!(basenames(index.released()), vec!["foo-1.0", "foo-1.1"]);
        assert_eq!(basenames(index.latest()), vec!["foo-1.1"]);
        assert_eq!(basenames(index.prereleases()), vec!["bar-0.1.a", "foo-2.0.pre"]);
    }

    #[test]
    fn latest_is_one_entry_per_name() {
        let index: Index = [
            spec("nokogiri", "1.15.0", None),
            spec("nokogiri", "1.15.0", Some("x86_64-linux")),
            spec("nokogiri", "1.14.0", Some("java")),
        ]
        .into_iter()
        .collect();

        assert_eq!(basenames(index.latest()), vec!["nokogiri-1.15.0-x86_64-linux"]);
    }

    #[test]
    fn find_defaults_to_generic_newest_release() {
        let index: Index = [
            spec("rack", "2.2", None),
            spec("rack", "3.0", None),
            spec("rack", "3.1.beta", None),
            spec("rack", "3.1", Some("java")),
        ]
        .into_iter()
        .collect();

        assert_eq!(index.find("rack", None, None).unwrap().basename(), "rack-3.0");
        assert_eq!(
            index.find("rack", None, Some("java")).unwrap().basename(),
            "rack-3.1-java"
        );
        assert_eq!(
            index
                .find("rack", Some(&Version::parse("3.1.beta").unwrap()), Some("ruby"))
                .unwrap()
                .basename(),
            "rack-3.1.beta"
        );
        assert!(index.find("rails", None, None).is_none());
    }
}
