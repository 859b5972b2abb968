use std::collections::BTreeMap;

use serde::Deserialize;

pub const REQUIRED: &str = "This field is required.";
pub const USERNAME_TAKEN: &str = "A user with that username already exists.";
pub const INVALID_IMAGE: &str =
    "Upload a valid image. The file you uploaded was either not an image or a corrupted image.";

const USERNAME_MAX_LEN: usize = 150;
const RESERVED_USERNAMES: &[&str] = &["@me"];

/// Field-level validation errors, keyed by form field name.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormErrors {
    fields: BTreeMap<&'static str, Vec<String>>,
    general: Vec<String>,
}

impl FormErrors {
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.fields.entry(field).or_default().push(message.into());
    }

    /// Errors not tied to a single field (e.g. bad credentials).
    pub fn add_general(&mut self, message: impl Into<String>) {
        self.general.push(message.into());
    }

    pub fn field(&self, field: &str) -> &[String] {
        self.fields.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn general(&self) -> &[String] {
        &self.general
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.general.is_empty()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::default();
        errors.add(field, message);
        errors
    }

    fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() { Ok(value) } else { Err(self) }
    }
}

fn required(errors: &mut FormErrors, field: &'static str, value: &str) -> String {
    let value = value.trim();
    if value.is_empty() {
        errors.add(field, REQUIRED);
    }
    value.to_string()
}

// -- Echoes & waves --

/// Body of the create/edit echo form.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct EchoForm {
    #[serde(default)]
    pub content: String,
}

impl EchoForm {
    /// Returns the cleaned content.
    pub fn validate(&self) -> Result<String, FormErrors> {
        let mut errors = FormErrors::default();
        let content = required(&mut errors, "content", &self.content);
        errors.into_result(content)
    }
}

/// Body of the create/edit wave form. The parent echo is taken from the URL
/// path, never from the body.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct WaveForm {
    #[serde(default)]
    pub content: String,
}

impl WaveForm {
    pub fn validate(&self) -> Result<String, FormErrors> {
        let mut errors = FormErrors::default();
        let content = required(&mut errors, "content", &self.content);
        errors.into_result(content)
    }
}

// -- Accounts --

#[derive(Debug, Default, Clone, Deserialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<(String, String), FormErrors> {
        let mut errors = FormErrors::default();
        let username = required(&mut errors, "username", &self.username);
        if self.password.is_empty() {
            errors.add("password", REQUIRED);
        }
        errors.into_result((username, self.password.clone()))
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
pub struct SignupForm {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub email: String,
}

/// A signup that passed field validation. Username uniqueness is checked
/// against the database by the caller.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub password: String,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
}

impl SignupForm {
    pub fn validate(&self) -> Result<NewUser, FormErrors> {
        let mut errors = FormErrors::default();

        let username = required(&mut errors, "username", &self.username);
        if !username.is_empty() {
            if username.chars().count() > USERNAME_MAX_LEN {
                errors.add(
                    "username",
                    format!("Ensure this value has at most {} characters.", USERNAME_MAX_LEN),
                );
            }
            if !username.chars().all(is_username_char) {
                errors.add(
                    "username",
                    "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                );
            }
            if RESERVED_USERNAMES.contains(&username.as_str()) {
                errors.add("username", "This username is reserved.");
            }
        }

        if self.password.is_empty() {
            errors.add("password", REQUIRED);
        }

        let email = self.email.trim().to_string();
        if !email.is_empty() && !looks_like_email(&email) {
            errors.add("email", "Enter a valid email address.");
        }

        errors.into_result(NewUser {
            username,
            password: self.password.clone(),
            first_name: self.first_name.trim().to_string(),
            last_name: self.last_name.trim().to_string(),
            email,
        })
    }
}

fn is_username_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_')
}

fn looks_like_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        None => false,
    }
}

// -- Profiles --

/// Image formats accepted as avatars, detected from the file's leading bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Webp,
}

impl ImageKind {
    pub fn sniff(data: &[u8]) -> Option<Self> {
        if data.starts_with(b"\x89PNG\r\n\x1a\n") {
            Some(Self::Png)
        } else if data.starts_with(&[0xFF, 0xD8, 0xFF]) {
            Some(Self::Jpeg)
        } else if data.starts_with(b"GIF87a") || data.starts_with(b"GIF89a") {
            Some(Self::Gif)
        } else if data.len() >= 12 && &data[..4] == b"RIFF" && &data[8..12] == b"WEBP" {
            Some(Self::Webp)
        } else {
            None
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::Gif => "gif",
            Self::Webp => "webp",
        }
    }
}

/// An uploaded avatar as received from the multipart body.
#[derive(Debug, Clone)]
pub struct AvatarUpload {
    pub file_name: String,
    pub data: Vec<u8>,
}

/// Multipart edit-profile submission. An absent or empty avatar part keeps
/// the current avatar.
#[derive(Debug, Default, Clone)]
pub struct ProfileForm {
    pub bio: String,
    pub avatar: Option<AvatarUpload>,
}

pub fn avatar_too_large(max_avatar_bytes: usize) -> String {
    format!("The image is too large (max {} bytes).", max_avatar_bytes)
}

/// A validated avatar ready to be written to media storage.
#[derive(Debug, Clone)]
pub struct CleanAvatar {
    pub kind: ImageKind,
    pub data: Vec<u8>,
}

impl ProfileForm {
    pub fn validate(&self, max_avatar_bytes: usize) -> Result<(String, Option<CleanAvatar>), FormErrors> {
        let mut errors = FormErrors::default();
        let bio = self.bio.trim().to_string();

        let avatar = match &self.avatar {
            Some(upload) if !upload.data.is_empty() => {
                if upload.data.len() > max_avatar_bytes {
                    errors.add("avatar", avatar_too_large(max_avatar_bytes));
                    None
                } else if let Some(kind) = ImageKind::sniff(&upload.data) {
                    Some(CleanAvatar { kind, data: upload.data.clone() })
                } else {
                    errors.add("avatar", INVALID_IMAGE);
                    None
                }
            }
            _ => None,
        };

        errors.into_result((bio, avatar))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_HEADER: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

    #[test]
    fn echo_content_is_required() {
        let err = EchoForm { content: "   \n".into() }.validate().unwrap_err();
        assert_eq!(err.field("content"), [REQUIRED.to_string()]);
    }

    #[test]
    fn echo_content_is_trimmed() {
        let content = EchoForm { content: "  hello tribu  ".into() }.validate().unwrap();
        assert_eq!(content, "hello tribu");
    }

    #[test]
    fn wave_content_is_required() {
        assert!(WaveForm::default().validate().is_err());
        assert_eq!(WaveForm { content: "hi".into() }.validate().unwrap(), "hi");
    }

    #[test]
    fn signup_requires_username_and_password() {
        let err = SignupForm::default().validate().unwrap_err();
        assert_eq!(err.field("username"), [REQUIRED.to_string()]);
        assert_eq!(err.field("password"), [REQUIRED.to_string()]);
        assert!(err.field("email").is_empty());
    }

    #[test]
    fn signup_rejects_bad_usernames() {
        let form = SignupForm {
            username: "bad name!".into(),
            password: "pw".into(),
            ..Default::default()
        };
        assert_eq!(form.validate().unwrap_err().field("username").len(), 1);

        let reserved = SignupForm {
            username: "@me".into(),
            password: "pw".into(),
            ..Default::default()
        };
        assert!(reserved.validate().is_err());
    }

    #[test]
    fn signup_validates_email_only_when_present() {
        let mut form = SignupForm {
            username: "ana.b+1@x".into(),
            password: "secret".into(),
            ..Default::default()
        };
        assert!(form.validate().is_ok());

        form.email = "not-an-email".into();
        assert_eq!(form.validate().unwrap_err().field("email").len(), 1);

        form.email = "ana@example.com".into();
        assert_eq!(form.validate().unwrap().email, "ana@example.com");
    }

    #[test]
    fn login_keeps_password_verbatim() {
        let (username, password) = LoginForm {
            username: " tribu ".into(),
            password: " spaced ".into(),
        }
        .validate()
        .unwrap();
        assert_eq!(username, "tribu");
        assert_eq!(password, " spaced ");
    }

    #[test]
    fn sniff_known_image_formats() {
        assert_eq!(ImageKind::sniff(PNG_HEADER), Some(ImageKind::Png));
        assert_eq!(ImageKind::sniff(&[0xFF, 0xD8, 0xFF, 0xE0]), Some(ImageKind::Jpeg));
        assert_eq!(ImageKind::sniff(b"GIF89a...."), Some(ImageKind::Gif));
        assert_eq!(ImageKind::sniff(b"RIFF\0\0\0\0WEBPVP8 "), Some(ImageKind::Webp));
        assert_eq!(ImageKind::sniff(b"hello world"), None);
    }

    #[test]
    fn profile_form_rejects_non_images_and_oversized_files() {
        let not_image = ProfileForm {
            bio: "bio".into(),
            avatar: Some(AvatarUpload { file_name: "a.txt".into(), data: b"text".to_vec() }),
        };
        assert_eq!(not_image.validate(1024).unwrap_err().field("avatar"), [INVALID_IMAGE.to_string()]);

        let too_big = ProfileForm {
            bio: String::new(),
            avatar: Some(AvatarUpload { file_name: "a.png".into(), data: PNG_HEADER.to_vec() }),
        };
        assert!(too_big.validate(4).is_err());
    }

    #[test]
    fn profile_form_without_avatar_keeps_current() {
        let form = ProfileForm {
            bio: " new bio ".into(),
            avatar: Some(AvatarUpload { file_name: String::new(), data: vec![] }),
        };
        let (bio, avatar) = form.validate(1024).unwrap();
        assert_eq!(bio, "new bio");
        assert!(avatar.is_none());
    }
}
