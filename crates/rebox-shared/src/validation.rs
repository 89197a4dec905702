use crate::constants::*;
use crate::error::ValidationError;

fn require_trimmed<'a>(value: &'a str, field: &'static str) -> Result<&'a str, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Required { field });
    }
    Ok(trimmed)
}

fn limit(value: &str, field: &'static str, max: usize) -> Result<(), ValidationError> {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<(), ValidationError> {
    let email = require_trimmed(email, "Email")?;
    limit(email, "Email", MAX_EMAIL_LENGTH)?;
    let (local, domain) = email.split_once('@').ok_or(ValidationError::InvalidEmail)?;
    if local.is_empty() || domain.is_empty() || !domain.contains('.') || domain.contains('@') {
        return Err(ValidationError::InvalidEmail);
    }
    if email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Required { field: "Password" });
    }
    if password.chars().count() < MIN_PASSWORD_LENGTH {
        return Err(ValidationError::TooShort {
            field: "Password",
            min: MIN_PASSWORD_LENGTH,
        });
    }
    limit(password, "Password", MAX_PASSWORD_LENGTH)
}

pub fn validate_display_name(name: &str) -> Result<(), ValidationError> {
    let name = require_trimmed(name, "Name")?;
    limit(name, "Name", MAX_NAME_LENGTH)
}

pub fn validate_item_title(title: &str) -> Result<(), ValidationError> {
    let title = require_trimmed(title, "Title")?;
    limit(title, "Title", MAX_ITEM_TITLE_LENGTH)
}

pub fn validate_item_description(description: &str) -> Result<(), ValidationError> {
    limit(description.trim(), "Description", MAX_ITEM_DESCRIPTION_LENGTH)
}

pub fn validate_photo_url(url: &str) -> Result<(), ValidationError> {
    let url = require_trimmed(url, "Photo")?;
    limit(url, "Photo", MAX_PHOTO_URL_LENGTH)
}

pub fn validate_message_text(text: &str) -> Result<(), ValidationError> {
    let text = require_trimmed(text, "Message")?;
    limit(text, "Message", MAX_MESSAGE_LENGTH)
}
