/// Ordered, case-insensitive, multi-valued string metadata.
///
/// Used for request headers, response header metadata and trailer metadata.
/// Keys compare case-insensitively (ASCII), the casing seen first for a key is
/// the casing reported by [`Metadata::entries`], and the values of a key keep
/// their insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    entries: Vec<(String, Vec<String>)>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    fn position(&self, key: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|(existing, _)| existing.eq_ignore_ascii_case(key))
    }

    /// Returns every value stored for `key`, in insertion order.
    pub fn get(&self, key: &str) -> Option<&[String]> {
        self.position(key)
            .map(|index| self.entries[index].1.as_slice())
    }

    /// Returns the first value stored for `key`.
    pub fn get_first(&self, key: &str) -> Option<&str> {
        self.get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    /// Replaces all values of `key` with `value`.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        match self.position(&key) {
            Some(index) => self.entries[index].1 = vec![value],
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Adds `value` after any values already stored for `key`.
    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        let key = key.into();
        let value = value.into();

        match self.position(&key) {
            Some(index) => self.entries[index].1.push(value),
            None => self.entries.push((key, vec![value])),
        }
    }

    /// Removes `key`, returning its values.
    pub fn remove(&mut self, key: &str) -> Option<Vec<String>> {
        self.position(key)
            .map(|index| self.entries.remove(index).1)
    }

    /// Iterates keys (first-seen casing) with their values, in insertion order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.entries
            .iter()
            .map(|(key, values)| (key.as_str(), values.as_slice()))
    }

    /// Number of distinct keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Appends every value of `other` into `self`.
    pub fn extend(&mut self, other: &Metadata) {
        for (key, values) in other.entries() {
            for value in values {
                self.append(key, value.as_str());
            }
        }
    }
}

impl<K, V> FromIterator<(K, V)> for Metadata
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut metadata = Metadata::new();
        for (key, value) in iter {
            metadata.append(key, value);
        }
        metadata
    }
}
