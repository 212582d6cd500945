//! Cache categories and the persisted key layout
//!
//! ```text
//! entry:     cache_<category>_<key>[_user_<owner>]
//! metadata:  meta_cache_<category>_<key>[_user_<owner>]
//! image:     cache_images_image_<sha256(url)>.<ext>[_user_<owner>]
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prefix shared by every record entry key
pub const ENTRY_PREFIX: &str = "cache_";

/// Prefix prepended to an entry key to form its metadata key
pub const METADATA_PREFIX: &str = "meta_";

const OWNER_MARKER: &str = "_user_";
const IMAGE_RECORD_PREFIX: &str = "cache_images_image_";

/// Namespace of a cached record.
///
/// Only [`CacheCategory::Images`] carries behaviour: its records describe
/// files in the asset directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheCategory {
    Audio,
    RequestSettings,
    Images,
    UserData,
}

impl CacheCategory {
    pub const ALL: [CacheCategory; 4] = [
        CacheCategory::Audio,
        CacheCategory::RequestSettings,
        CacheCategory::Images,
        CacheCategory::UserData,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheCategory::Audio => "audio",
            CacheCategory::RequestSettings => "request_settings",
            CacheCategory::Images => "images",
            CacheCategory::UserData => "user_data",
        }
    }

    /// Recover the category from a storage key.
    pub fn from_storage_key(storage_key: &str) -> Option<Self> {
        let rest = storage_key.strip_prefix(ENTRY_PREFIX)?;
        Self::ALL.into_iter().find(|category| {
            rest.strip_prefix(category.as_str())
                .is_some_and(|tail| tail.starts_with('_'))
        })
    }
}

impl fmt::Display for CacheCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Build the storage key of a record.
pub fn storage_key(category: CacheCategory, key: &str, owner_id: Option<&str>) -> String {
    match owner_id {
        Some(owner) => format!(
            "{}{}_{}{}{}",
            ENTRY_PREFIX,
            category.as_str(),
            key,
            OWNER_MARKER,
            owner
        ),
        None => format!("{}{}_{}", ENTRY_PREFIX, category.as_str(), key),
    }
}

/// Metadata key paired with an entry key.
pub fn metadata_key(storage_key: &str) -> String {
    format!("{}{}", METADATA_PREFIX, storage_key)
}

/// Whether `owner_id` can namespace a key. Empty ids and ids containing
/// the owner marker would make [`belongs_to`] match other owners' keys.
pub fn is_valid_owner(owner_id: &str) -> bool {
    !owner_id.is_empty() && !owner_id.contains(OWNER_MARKER)
}

/// Whether `storage_key` is namespaced to `owner_id`.
///
/// Matching is by suffix, so a shared entry whose logical key itself ends
/// in `_user_<owner>` is also attributed to that owner.
pub fn belongs_to(storage_key: &str, owner_id: &str) -> bool {
    storage_key
        .strip_suffix(owner_id)
        .is_some_and(|head| head.ends_with(OWNER_MARKER))
}

/// Logical key of the image record for `filename`.
pub fn image_record_key(filename: &str) -> String {
    format!("image_{}", filename)
}

/// Prefix matching the image records of `filename` under every owner.
pub fn image_record_prefix(filename: &str) -> String {
    format!("{}{}", IMAGE_RECORD_PREFIX, filename)
}

/// Asset filename referenced by an image record key, if it is one.
///
/// Asset filenames are hex digits, a dot and an alphanumeric extension, so
/// the first underscore after the prefix starts the owner suffix.
pub fn image_filename(storage_key: &str) -> Option<&str> {
    let rest = storage_key.strip_prefix(IMAGE_RECORD_PREFIX)?;
    let filename = rest.split('_').next().unwrap_or(rest);
    (!filename.is_empty()).then_some(filename)
}
