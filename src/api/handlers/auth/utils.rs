//! Input shaping shared by the auth handlers.

use crate::otp::{NewAccountDefaults, OtpError};

const MAX_NAME_LEN: usize = 100;
const MAX_NOTE_LEN: usize = 500;
const MAX_PHONE_LEN: usize = 32;

/// Trim an optional profile field; blank becomes `None`.
fn profile_field(
    value: Option<String>,
    max_len: usize,
    too_long: &'static str,
) -> Result<Option<String>, OtpError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    if trimmed.chars().count() > max_len {
        return Err(OtpError::Validation(too_long));
    }
    Ok(Some(trimmed.to_string()))
}

pub(super) fn new_account_defaults(
    name: Option<String>,
    note: Option<String>,
    phone: Option<String>,
) -> Result<NewAccountDefaults, OtpError> {
    Ok(NewAccountDefaults {
        name: profile_field(name, MAX_NAME_LEN, "Name is too long")?,
        note: profile_field(note, MAX_NOTE_LEN, "Note is too long")?,
        phone: profile_field(phone, MAX_PHONE_LEN, "Phone is too long")?,
    })
}
