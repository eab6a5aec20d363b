//! Purpose: Build `application/x-www-form-urlencoded` request bodies.
//! Exports: `FormBody`, `FORM_CONTENT_TYPE`.
//! Role: Value type handed to the POST helpers; encoding happens once at build time.
//! Invariants: `as_str` always returns an encoded payload, never raw user text.
//! Invariants: Pre-encoded input is passed through verbatim.
use url::form_urlencoded;

pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct FormBody {
    encoded: String,
}

impl FormBody {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a payload the caller already encoded.
    pub fn from_encoded(encoded: impl Into<String>) -> Self {
        Self {
            encoded: encoded.into(),
        }
    }

    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut serializer = form_urlencoded::Serializer::new(String::new());
        serializer.extend_pairs(pairs);
        Self {
            encoded: serializer.finish(),
        }
    }

    pub fn append(mut self, key: &str, value: &str) -> Self {
        let mut serializer =
            form_urlencoded::Serializer::for_suffix(std::mem::take(&mut self.encoded), 0);
        serializer.append_pair(key, value);
        self.encoded = serializer.finish();
        self
    }

    pub fn as_str(&self) -> &str {
        &self.encoded
    }

    pub fn is_empty(&self) -> bool {
        self.encoded.is_empty()
    }

    /// Decodes the payload back into key/value pairs.
    pub fn pairs(&self) -> Vec<(String, String)> {
        form_urlencoded::parse(self.encoded.as_bytes())
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect()
    }
}
