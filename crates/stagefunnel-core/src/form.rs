//! Form inputs, the submit guard and the photo lookup lifecycle.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;
use crate::photo::{PhotoRequest, ProfilePhoto};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
    NonBinary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LastActive {
    Last7Days,
    Last30Days,
    OverAMonth,
    NotSure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relocation {
    Yes,
    No,
    Unknown,
}

/// Shared `FromStr` for the option enums: accepts the serialized name with
/// `-` or `_` separators, case-insensitively.
macro_rules! option_from_str {
    ($ty:ty, $field:literal, [$($name:literal => $variant:expr),+ $(,)?]) => {
        impl FromStr for $ty {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let key = s.trim().to_ascii_lowercase().replace('-', "_");
                match key.as_str() {
                    $($name => Ok($variant),)+
                    _ => Err(ValidationError::InvalidValue {
                        field: $field.into(),
                        message: format!(
                            "unknown option '{s}', expected one of: {}",
                            [$($name),+].join(", ")
                        ),
                    }),
                }
            }
        }
    };
}

option_from_str!(Gender, "gender", [
    "male" => Gender::Male,
    "female" => Gender::Female,
    "non_binary" => Gender::NonBinary,
]);

option_from_str!(LastActive, "last_active", [
    "last_7_days" => LastActive::Last7Days,
    "last_30_days" => LastActive::Last30Days,
    "over_a_month" => LastActive::OverAMonth,
    "not_sure" => LastActive::NotSure,
]);

option_from_str!(Relocation, "relocation", [
    "yes" => Relocation::Yes,
    "no" => Relocation::No,
    "unknown" => Relocation::Unknown,
]);

/// Photo lifecycle tied to the phone field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PhotoState {
    #[default]
    Absent,
    Loading {
        request_id: u64,
        phone: String,
    },
    Resolved {
        request_id: u64,
        phone: String,
        photo: ProfilePhoto,
    },
}

impl PhotoState {
    pub fn is_resolved(&self) -> bool {
        matches!(self, PhotoState::Resolved { .. })
    }

    pub fn photo(&self) -> Option<&ProfilePhoto> {
        match self {
            PhotoState::Resolved { photo, .. } => Some(photo),
            _ => None,
        }
    }

    /// Digits the current request or photo belongs to.
    fn phone(&self) -> Option<&str> {
        match self {
            PhotoState::Absent => None,
            PhotoState::Loading { phone, .. } | PhotoState::Resolved { phone, .. } => Some(phone),
        }
    }
}

/// Effect of a phone edit on the photo.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhoneEdit {
    /// Photo state untouched.
    Unchanged,
    /// Phone fell below the minimum; photo reset to absent.
    Cleared,
    /// A new lookup must be performed; any earlier one is now stale.
    Requested(PhotoRequest),
}

/// Which guard predicates hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct GuardReport {
    pub phone: bool,
    pub gender: bool,
    pub photo: bool,
    pub last_active: bool,
    pub relocation: bool,
}

impl GuardReport {
    pub fn passes(&self) -> bool {
        self.phone && self.gender && self.photo && self.last_active && self.relocation
    }

    pub fn missing(&self) -> Vec<&'static str> {
        [
            (self.phone, "phone"),
            (self.gender, "gender"),
            (self.photo, "photo"),
            (self.last_active, "last_active"),
            (self.relocation, "relocation"),
        ]
        .iter()
        .filter(|(ok, _)| !ok)
        .map(|&(_, name)| name)
        .collect()
    }
}

/// Only the ASCII digits of `text`.
pub fn phone_digits(text: &str) -> String {
    text.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FormInputs {
    pub phone: String,
    pub gender: Option<Gender>,
    pub last_active: Option<LastActive>,
    pub relocation: Option<Relocation>,
    pub photo: PhotoState,
    #[serde(default)]
    next_request_id: u64,
}

impl FormInputs {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the phone text and work out what it means for the photo.
    ///
    /// Once the digits reach `min_digits`, every edit that changes them
    /// issues a new keyed request; edits that leave the digits as they were
    /// (formatting characters) do not.
    pub fn set_phone(&mut self, text: &str, min_digits: usize) -> PhoneEdit {
        self.phone = text.to_string();
        let digits = phone_digits(text);

        if digits.len() < min_digits {
            if self.photo == PhotoState::Absent {
                return PhoneEdit::Unchanged;
            }
            self.photo = PhotoState::Absent;
            return PhoneEdit::Cleared;
        }

        if self.photo.phone() == Some(digits.as_str()) {
            return PhoneEdit::Unchanged;
        }

        self.next_request_id += 1;
        let request = PhotoRequest {
            request_id: self.next_request_id,
            phone: digits.clone(),
        };
        self.photo = PhotoState::Loading {
            request_id: request.request_id,
            phone: digits,
        };
        PhoneEdit::Requested(request)
    }

    /// Apply a lookup result if it answers the pending request.
    ///
    /// Responses for any other request are stale and ignored.
    pub fn resolve_photo(&mut self, request_id: u64, photo: ProfilePhoto) -> bool {
        let phone = match &self.photo {
            PhotoState::Loading {
                request_id: pending,
                phone,
            } if *pending == request_id => phone.clone(),
            _ => return false,
        };
        self.photo = PhotoState::Resolved {
            request_id,
            phone,
            photo,
        };
        true
    }

    pub fn pending_request(&self) -> Option<u64> {
        match self.photo {
            PhotoState::Loading { request_id, .. } => Some(request_id),
            _ => None,
        }
    }

    pub fn guard(&self, min_digits: usize) -> GuardReport {
        GuardReport {
            phone: phone_digits(&self.phone).len() >= min_digits,
            gender: self.gender.is_some(),
            photo: self.photo.is_resolved(),
            last_active: self.last_active.is_some(),
            relocation: self.relocation.is_some(),
        }
    }

    pub fn can_submit(&self, min_digits: usize) -> bool {
        self.guard(min_digits).passes()
    }
}
