use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<u64> for $name {
            fn from(value: u64) -> Self {
                Self(value)
            }
        }
    };
}

id_type!(
    /// Store-assigned order number.
    OrderId
);
id_type!(
    /// Chat-platform user (purchaser or administrator).
    UserId
);
id_type!(ProductId);
id_type!(VariationId);
id_type!(
    /// Platform role granted as the entitlement.
    RoleId
);
id_type!(
    /// Private conversation where an order is followed up.
    LocusId
);
