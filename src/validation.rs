use rustrict::CensorStr;
use crate::challenge::NewChallenge;

const MAX_NAME_LEN: usize = 32;
const MAX_SPORT_LEN: usize = 32;
const MAX_MESSAGE_LEN: usize = 280;

/// Validate and sanitize a user or team display name.
/// Returns the trimmed name on success, or an error message.
pub fn validate_display_name(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("Name cannot be empty".to_string());
    }
    if trimmed.chars().count() > MAX_NAME_LEN {
        return Err(format!("Name must be {} characters or fewer", MAX_NAME_LEN));
    }
    if trimmed.is_inappropriate() {
        return Err("Name contains inappropriate language".to_string());
    }
    Ok(trimmed.to_string())
}

pub fn validate_sport(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("Sport cannot be empty".to_string());
    }
    if trimmed.chars().count() > MAX_SPORT_LEN {
        return Err(format!("Sport must be {} characters or fewer", MAX_SPORT_LEN));
    }
    Ok(trimmed.to_lowercase())
}

/// Empty messages collapse to `None`.
pub fn validate_message(raw: Option<&str>) -> Result<Option<String>, String> {
    let Some(trimmed) = raw.map(str::trim).filter(|m| !m.is_empty()) else {
        return Ok(None);
    };
    if trimmed.chars().count() > MAX_MESSAGE_LEN {
        return Err(format!("Message must be {} characters or fewer", MAX_MESSAGE_LEN));
    }
    if trimmed.is_inappropriate() {
        return Err("Message contains inappropriate language".to_string());
    }
    Ok(Some(trimmed.to_string()))
}

/// Form-level checks on a challenge draft, run before it reaches the state machine.
pub fn validate_new_challenge(draft: NewChallenge, now: u64) -> Result<NewChallenge, String> {
    if draft.scheduled_at <= now {
        return Err("Match must be scheduled in the future".to_string());
    }
    if let Some(expires_at) = draft.expires_at {
        if expires_at >= draft.scheduled_at {
            return Err("Expiry must be before the scheduled match time".to_string());
        }
    }
    Ok(NewChallenge {
        sport: validate_sport(&draft.sport)?,
        message: validate_message(draft.message.as_deref())?,
        ..draft
    })
}
