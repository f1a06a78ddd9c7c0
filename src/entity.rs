/// Entity key metadata
///
/// Every payload type the feed can carry is tagged with the integer type code
/// the upstream writes into the message header. Registries read the tag once,
/// at build time.

use serde::de::DeserializeOwned;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(i32);

impl EntityKey {
    pub const fn new(key: i32) -> Self {
        EntityKey(key)
    }

    pub const fn get(self) -> i32 {
        self.0
    }
}

impl From<i32> for EntityKey {
    fn from(key: i32) -> Self {
        EntityKey(key)
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A decodable feed payload.
///
/// `ENTITY_KEY` is `None` for types that were never tagged; registering a
/// processor for such a type is a configuration error.
pub trait FeedEntity: DeserializeOwned + Send + Sync + 'static {
    const ENTITY_KEY: Option<EntityKey>;

    /// Short type name used in logs and error messages
    fn entity_name() -> &'static str {
        short_type_name::<Self>()
    }
}

pub(crate) fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    // strip the module path but keep generic arguments intact
    let head = full.split('<').next().unwrap_or(full);
    match head.rfind("::") {
        Some(idx) => &full[idx + 2..],
        None => full,
    }
}

/// Tags a type with its wire entity key.
///
/// ```ignore
/// feed_entity!(MarketUpdate => 3);
/// ```
#[macro_export]
macro_rules! feed_entity {
    ($ty:ty => $key:expr) => {
        impl $crate::entity::FeedEntity for $ty {
            const ENTITY_KEY: Option<$crate::entity::EntityKey> =
                Some($crate::entity::EntityKey::new($key));
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Tagged;

    #[derive(Debug, Deserialize)]
    struct Untagged;

    crate::feed_entity!(Tagged => 7);

    impl FeedEntity for Untagged {
        const ENTITY_KEY: Option<EntityKey> = None;
    }

    #[test]
    fn test_entity_keys() {
        assert_eq!(Tagged::ENTITY_KEY, Some(EntityKey::new(7)));
        assert_eq!(Untagged::ENTITY_KEY, None);
    }

    #[test]
    fn test_entity_name_is_short() {
        assert_eq!(Tagged::entity_name(), "Tagged");
        assert_eq!(short_type_name::<Vec<String>>(), "Vec<alloc::string::String>");
    }
}
