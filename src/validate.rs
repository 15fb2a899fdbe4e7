use base64::{Engine as _, engine::general_purpose};

use crate::{config::ContentLimits, protocol::MessageKind};

const IMAGE_TYPES: &[&str] = &["image/png", "image/jpeg", "image/gif", "image/webp"];
const VIDEO_TYPES: &[&str] = &["video/mp4", "video/webm"];

/// Decides whether a message payload may be relayed at all.
pub trait Validator: Send + Sync {
    fn validate(&self, kind: MessageKind, content: &str) -> Result<(), String>;
}

/// Length checks for text, data-URL checks for media.
#[derive(Debug, Clone, Copy)]
pub struct ContentRules {
    pub limits: ContentLimits,
}

impl ContentRules {
    pub fn new(limits: ContentLimits) -> Self {
        Self { limits }
    }
}

impl Validator for ContentRules {
    fn validate(&self, kind: MessageKind, content: &str) -> Result<(), String> {
        match kind {
            MessageKind::Text => {
                if content.trim().is_empty() {
                    return Err("message is empty".to_owned());
                }
                let chars = content.chars().count();
                if chars > self.limits.max_text_chars {
                    let max = self.limits.max_text_chars;
                    return Err(format!("message is {chars} characters, the limit is {max}"));
                }
                Ok(())
            }
            MessageKind::Image => check_data_url(content, IMAGE_TYPES, self.limits.max_image_bytes),
            MessageKind::Video => check_data_url(content, VIDEO_TYPES, self.limits.max_video_bytes),
        }
    }
}

fn check_data_url(content: &str, allowed: &[&str], max_bytes: usize) -> Result<(), String> {
    let (meta, data) = content
        .strip_prefix("data:")
        .and_then(|rest| rest.split_once(','))
        .ok_or("media must be a data URL")?;
    let mime = meta.strip_suffix(";base64").ok_or("media must be base64 encoded")?;

    if !allowed.contains(&mime) {
        return Err(format!("{mime} is not an accepted format"));
    }
    if data.is_empty() {
        return Err("media payload is empty".to_owned());
    }

    // refuse oversized payloads before decoding them
    let max_encoded = base64::encoded_len(max_bytes, true).unwrap_or(usize::MAX);
    if data.len() > max_encoded {
        return Err(format!("media is larger than the {max_bytes} byte limit"));
    }
    let decoded = general_purpose::STANDARD
        .decode(data)
        .map_err(|err| format!("media payload is not valid base64: {err}"))?;
    if decoded.len() > max_bytes {
        return Err(format!("media is {} bytes, the limit is {max_bytes}", decoded.len()));
    }
    Ok(())
}
