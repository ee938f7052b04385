use std::fmt;

use smallvec::SmallVec;

/// A single component of a [`CounterKey`].
///
/// Parts render deterministically into the canonical key fragment: a
/// [`Scalar`](Self::Scalar) renders as its string form, an
/// [`Identified`](Self::Identified) part as `Kind#id`. Callers resolve
/// whether a value carries a stable identity before building the part, which
/// keeps all rendering explicit and reflection-free.
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub enum KeyPart {
    /// An opaque string component.
    Scalar(String),
    /// A component with a stable identity, rendered as `Kind#id`.
    Identified {
        /// The type name of the identified value.
        kind: String,
        /// The stable identifier of the value.
        id: String,
    },
}

impl KeyPart {
    /// Creates a scalar part from its string form.
    pub fn scalar(value: impl Into<String>) -> Self {
        Self::Scalar(value.into())
    }

    /// Creates an identified part from a type name and a stable id.
    pub fn identified(kind: impl Into<String>, id: impl ToString) -> Self {
        Self::Identified {
            kind: kind.into(),
            id: id.to_string(),
        }
    }
}

impl fmt::Display for KeyPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Scalar(value) => f.write_str(value),
            Self::Identified { kind, id } => write!(f, "{kind}#{id}"),
        }
    }
}

impl From<&str> for KeyPart {
    fn from(value: &str) -> Self {
        Self::scalar(value)
    }
}

impl From<String> for KeyPart {
    fn from(value: String) -> Self {
        Self::Scalar(value)
    }
}

/// One canonical string key identifying a single counter series.
///
/// Fragments are derived from a [`CounterKey`] via [`CounterKey::fragments`]
/// and address the Redis namespace holding the series' total and buckets.
#[derive(Clone, Debug, Hash, PartialEq, Eq, PartialOrd, Ord)]
pub struct Fragment(String);

impl Fragment {
    /// Returns the fragment as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Fragment {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// The cascade of fragments derived from one key, most specific first.
pub type Fragments = SmallVec<[Fragment; 4]>;

/// An application-defined counter key, optionally composed of hierarchical
/// parts.
///
/// A bare key derives exactly one fragment; a key of depth `n` derives `n`
/// fragments, one per ancestor prefix, so that an increment cascades to all
/// parents:
///
/// ```
/// use tally::{CounterKey, KeyPart};
///
/// let key = CounterKey::from(vec![
///     KeyPart::scalar("clicks"),
///     KeyPart::identified("User", 1),
/// ]);
///
/// let fragments: Vec<_> = key.fragments().iter().map(|f| f.to_string()).collect();
/// assert_eq!(fragments, ["clicks/User#1", "clicks"]);
/// ```
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct CounterKey(SmallVec<[KeyPart; 4]>);

impl CounterKey {
    /// Creates a key from an ordered sequence of parts.
    pub fn new(parts: impl IntoIterator<Item = KeyPart>) -> Self {
        Self(parts.into_iter().collect())
    }

    /// Returns `true` if the key has no parts.
    ///
    /// Empty keys are malformed and rejected by all counter operations.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Derives the cascade of canonical fragments, most specific first.
    ///
    /// Parts render independently and prefixes join with `/`. The derivation
    /// is purely a function of the parts, with no locale or environment
    /// dependence.
    pub fn fragments(&self) -> Fragments {
        let rendered: SmallVec<[String; 4]> = self.0.iter().map(ToString::to_string).collect();

        (1..=rendered.len())
            .rev()
            .map(|len| Fragment(rendered[..len].join("/")))
            .collect()
    }
}

impl From<KeyPart> for CounterKey {
    fn from(part: KeyPart) -> Self {
        Self::new([part])
    }
}

impl From<&str> for CounterKey {
    fn from(value: &str) -> Self {
        Self::new([KeyPart::scalar(value)])
    }
}

impl From<String> for CounterKey {
    fn from(value: String) -> Self {
        Self::new([KeyPart::Scalar(value)])
    }
}

impl From<Vec<KeyPart>> for CounterKey {
    fn from(parts: Vec<KeyPart>) -> Self {
        Self::new(parts)
    }
}

impl<const N: usize> From<[KeyPart; N]> for CounterKey {
    fn from(parts: [KeyPart; N]) -> Self {
        Self::new(parts)
    }
}

impl FromIterator<KeyPart> for CounterKey {
    fn from_iter<T: IntoIterator<Item = KeyPart>>(iter: T) -> Self {
        Self::new(iter)
    }
}
