//! Vault item types as exchanged with `bw serve`.
//!
//! Field names follow the camelCase JSON the server emits. Empty values are
//! left out when serializing, and explicit `null`s from the server decode to
//! the empty value so callers never deal with `Option<Vec<_>>`. Keys with no
//! field here (`secureNote`, `card`, `fido2Credentials`, ...) are kept in
//! `extra` and written back unchanged.

use std::collections::BTreeSet;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// Declares a wire enum that is an integer on the JSON side.
///
/// Unknown integers are kept in `Other` so an item fetched from a newer
/// server survives an update unchanged.
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $name:ident { $($(#[$vmeta:meta])* $variant:ident = $value:literal,)+ }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
        #[serde(from = "u8", into = "u8")]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
            /// A value this crate does not know about.
            Other(u8),
        }

        impl From<u8> for $name {
            fn from(value: u8) -> Self {
                match value {
                    $($value => Self::$variant,)+
                    other => Self::Other(other),
                }
            }
        }

        impl From<$name> for u8 {
            fn from(value: $name) -> Self {
                match value {
                    $($name::$variant => $value,)+
                    $name::Other(other) => other,
                }
            }
        }
    };
}

wire_enum! {
    /// Kind of vault item.
    ItemType {
        Login = 1,
        SecureNote = 2,
        Card = 3,
        Identity = 4,
        SshKey = 5,
    }
}

wire_enum! {
    /// Kind of custom field.
    FieldType {
        Text = 0,
        Hidden = 1,
        Boolean = 2,
        Linked = 3,
    }
}

wire_enum! {
    /// URI match strategy used for autofill.
    UriMatch {
        Domain = 0,
        Host = 1,
        StartsWith = 2,
        Exact = 3,
        RegularExpression = 4,
        Never = 5,
    }
}

wire_enum! {
    /// Whether the master password is re-requested before showing the item.
    Reprompt {
        None = 0,
        Password = 1,
    }
}

impl Default for ItemType {
    fn default() -> Self {
        Self::Login
    }
}

impl Default for FieldType {
    fn default() -> Self {
        Self::Text
    }
}

impl Default for Reprompt {
    fn default() -> Self {
        Self::None
    }
}

impl Reprompt {
    #[allow(clippy::trivially_copy_pass_by_ref)]
    fn is_none(&self) -> bool {
        *self == Self::None
    }
}

/// A vault entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    /// Server-assigned id; empty until the item has been created.
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "String::is_empty")]
    pub id: String,
    #[serde(
        default,
        alias = "organizationid",
        skip_serializing_if = "Option::is_none"
    )]
    pub organization_id: Option<String>,
    #[serde(
        default,
        alias = "collectionid",
        deserialize_with = "nullable",
        skip_serializing_if = "BTreeSet::is_empty"
    )]
    pub collection_ids: BTreeSet<String>,
    #[serde(default, alias = "folderid", skip_serializing_if = "Option::is_none")]
    pub folder_id: Option<String>,
    #[serde(rename = "type", default)]
    pub item_type: ItemType,
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "is_false")]
    pub favorite: bool,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login: Option<Login>,
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Reprompt::is_none")]
    pub reprompt: Reprompt,
    /// Last modification time as reported by the server (RFC 3339).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_date: Option<String>,
    /// Set when the item sits in the trash.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deleted_date: Option<String>,
    /// Everything else the server sent.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Item {
    /// Build a new login item with just a username and password.
    ///
    /// ```
    /// use bitwarden_api::{Item, ItemType};
    ///
    /// let item = Item::login("test", "hello", "world");
    /// assert_eq!(item.item_type, ItemType::Login);
    /// assert!(item.id.is_empty());
    /// ```
    pub fn login(
        name: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            item_type: ItemType::Login,
            name: name.into(),
            login: Some(Login {
                username: Some(username.into()),
                password: Some(password.into()),
                ..Login::default()
            }),
            ..Self::default()
        }
    }

    /// Login username, if this item has one.
    pub fn username(&self) -> Option<&str> {
        self.login.as_ref().and_then(|l| l.username.as_deref())
    }

    /// Login password, if this item has one.
    pub fn password(&self) -> Option<&str> {
        self.login.as_ref().and_then(|l| l.password.as_deref())
    }

    /// Mutable access to the login block, creating an empty one if needed.
    pub fn login_mut(&mut self) -> &mut Login {
        self.login.get_or_insert_with(Login::default)
    }
}

/// Credentials attached to a login item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Login {
    #[serde(default, deserialize_with = "nullable", skip_serializing_if = "Vec::is_empty")]
    pub uris: Vec<LoginUri>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub totp: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A URI a login applies to.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginUri {
    /// `None` means the account-wide default strategy.
    #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
    pub match_type: Option<UriMatch>,
    #[serde(default, deserialize_with = "nullable")]
    pub uri: String,
}

/// A custom field on an item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Field {
    #[serde(default, deserialize_with = "nullable")]
    pub name: String,
    #[serde(default, deserialize_with = "nullable")]
    pub value: String,
    #[serde(rename = "type", default, deserialize_with = "nullable")]
    pub field_type: FieldType,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[allow(clippy::trivially_copy_pass_by_ref)]
fn is_false(b: &bool) -> bool {
    !*b
}

/// Decode `null` as the type's default.
fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
