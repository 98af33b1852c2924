use axum::extract::multipart::MultipartError;
use axum::extract::{FromRequest, Multipart, Request};
use axum::http::header::CONTENT_TYPE;
use axum::http::StatusCode;
use axum::Form;
use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::{Validate, ValidationError, ValidationErrors};

use crate::app::media::Upload;
use crate::http::AppError;
use crate::AppState;

pub const REQUIRED: &str = "This field is required.";
pub const INVALID_CHOICE: &str =
    "Select a valid choice. That choice is not one of the available choices.";
pub const NON_FIELD_ERRORS: &str = "__all__";

/// Field name → messages, in the shape a form template would consume.
#[derive(Debug, Default, Clone, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct FormErrors(BTreeMap<String, Vec<String>>);

impl FormErrors {
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_validation(result: Result<(), ValidationErrors>) -> Self {
        let mut form_errors = Self::default();
        if let Err(errors) = result {
            for (field, field_errors) in errors.field_errors() {
                for error in field_errors.iter() {
                    let message = error
                        .message
                        .as_ref()
                        .map(|message| message.to_string())
                        .unwrap_or_else(|| error.code.to_string());
                    form_errors.add(field.to_string(), message);
                }
            }
        }
        form_errors
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, Validate)]
pub struct PostFields {
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub text: String,
    /// Raw group choice; empty means "no group".
    #[serde(default)]
    pub group: Option<String>,
}

impl PostFields {
    pub fn normalize(&mut self) {
        self.text = self.text.trim().to_string();
        self.group = self
            .group
            .take()
            .map(|group| group.trim().to_string())
            .filter(|group| !group.is_empty());
    }
}

/// Post form body, accepted both as multipart (with an optional `image`
/// file) and as urlencoded fields.
#[derive(Debug, Default)]
pub struct PostSubmission {
    pub fields: PostFields,
    pub image: Option<Upload>,
}

#[axum::async_trait]
impl FromRequest<AppState> for PostSubmission {
    type Rejection = AppError;

    async fn from_request(req: Request, state: &AppState) -> Result<Self, Self::Rejection> {
        let is_multipart = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(|value| value.starts_with("multipart/form-data"))
            .unwrap_or(false);

        if !is_multipart {
            let Form(fields) = Form::<PostFields>::from_request(req, state)
                .await
                .map_err(|rejection| AppError::new(rejection.status(), rejection.body_text()))?;
            return Ok(Self {
                fields,
                image: None,
            });
        }

        let mut multipart = Multipart::from_request(req, state)
            .await
            .map_err(|rejection| AppError::new(rejection.status(), rejection.body_text()))?;
        let mut submission = Self::default();

        match read_post_fields(&mut multipart, state.upload_max_bytes, &mut submission).await {
            Ok(()) => Ok(submission),
            // the body limit only trips on an oversized file; report it on the form
            Err(err) if err.status() == StatusCode::PAYLOAD_TOO_LARGE => {
                submission.image.get_or_insert_with(Upload::default).truncated = true;
                Ok(submission)
            }
            Err(err) => Err(AppError::new(err.status(), err.body_text())),
        }
    }
}

async fn read_post_fields(
    multipart: &mut Multipart,
    max_bytes: usize,
    submission: &mut PostSubmission,
) -> Result<(), MultipartError> {
    while let Some(mut field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "text" => submission.fields.text = field.text().await?,
            "group" => submission.fields.group = Some(field.text().await?),
            "image" => {
                let mut upload = Upload {
                    file_name: field.file_name().unwrap_or_default().to_string(),
                    content_type: field.content_type().map(str::to_string),
                    ..Upload::default()
                };

                // keep at most `max_bytes`; the rest is drained and dropped
                let mut data = BytesMut::new();
                while let Some(chunk) = field.chunk().await? {
                    if upload.truncated {
                        continue;
                    }
                    if data.len() + chunk.len() > max_bytes {
                        upload.truncated = true;
                        data.clear();
                        continue;
                    }
                    data.extend_from_slice(&chunk);
                }
                upload.data = data.freeze();

                // browsers send an empty part when no file was chosen
                if upload.truncated || !upload.file_name.is_empty() || !upload.data.is_empty() {
                    submission.image = Some(upload);
                }
            }
            _ => {}
        }
    }

    Ok(())
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, Validate)]
pub struct CommentForm {
    #[serde(default)]
    #[validate(length(min = 1, message = "This field is required."))]
    pub text: String,
}

impl CommentForm {
    pub fn normalize(&mut self) {
        self.text = self.text.trim().to_string();
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize, Validate)]
pub struct SignupForm {
    #[serde(default)]
    #[validate(
        length(
            min = 1,
            max = 150,
            message = "Required. 150 characters or fewer."
        ),
        custom(function = "validate_username")
    )]
    pub username: String,
    #[serde(default)]
    #[validate(email(message = "Enter a valid email address."))]
    pub email: Option<String>,
    #[serde(default, skip_serializing)]
    #[validate(length(
        min = 8,
        message = "This password is too short. It must contain at least 8 characters."
    ))]
    pub password: String,
}

impl SignupForm {
    pub fn normalize(&mut self) {
        self.username = self.username.trim().to_string();
        self.email = self
            .email
            .take()
            .map(|email| email.trim().to_string())
            .filter(|email| !email.is_empty());
    }
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct LoginForm {
    #[serde(default)]
    pub username: String,
    #[serde(default, skip_serializing)]
    pub password: String,
    #[serde(default)]
    pub next: Option<String>,
}

fn validate_username(username: &str) -> Result<(), ValidationError> {
    let valid = username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '.' | '@' | '+' | '-'));
    if valid {
        return Ok(());
    }
    let mut error = ValidationError::new("invalid_username");
    error.message = Some(
        "Enter a valid username. This value may contain only letters, numbers, and \
         @/./+/-/_ characters."
            .into(),
    );
    Err(error)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_text_is_required() {
        let mut fields = PostFields {
            text: "  \n\t ".to_string(),
            group: Some("   ".to_string()),
        };
        fields.normalize();
        assert_eq!(fields.group, None);

        let errors = FormErrors::from_validation(fields.validate());
        let mut expected = FormErrors::default();
        expected.add("text", REQUIRED);
        assert_eq!(errors, expected);
    }

    #[test]
    fn signup_collects_every_field_error() {
        let mut form = SignupForm {
            username: "bad name!".to_string(),
            email: Some("not-an-email".to_string()),
            password: "short".to_string(),
        };
        form.normalize();
        let errors = FormErrors::from_validation(form.validate());
        let json = serde_json::to_value(&errors).unwrap();
        assert!(json["username"][0]
            .as_str()
            .unwrap()
            .starts_with("Enter a valid username"));
        assert_eq!(json["email"][0], "Enter a valid email address.");
        assert!(json["password"][0].as_str().unwrap().contains("too short"));
    }

    #[test]
    fn signup_accepts_unicode_usernames_and_blank_email() {
        let mut form = SignupForm {
            username: " Лев.Толстой+1 ".to_string(),
            email: Some(" ".to_string()),
            password: "long enough password".to_string(),
        };
        form.normalize();
        assert_eq!(form.username, "Лев.Толстой+1");
        assert_eq!(form.email, None);
        assert!(form.validate().is_ok());
    }
}
