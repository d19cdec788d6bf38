//! Submitted forms and their validation.
//!
//! Each form validates into the request type its service expects, or into a
//! `FormErrors` list that the handler renders next to the offending fields.

use crate::services::{
    auth_service::LoginRequest,
    picture_service::{allowed_extension, PictureUpload},
    user_service::{CreateUserRequest, ProfileUpdate},
};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

pub const REQUIRED: &str = "This field is required.";

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]*[A-Za-z0-9])?)+$")
        .unwrap()
});

const MAX_EMAIL_LEN: usize = 120;

/// Ordered `(field, message)` pairs; at most one message per field.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct FormErrors {
    errors: Vec<(&'static str, String)>,
}

impl FormErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    /// Records `message` for `field` unless the field already has one.
    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        if self.get(field).is_none() {
            self.errors.push((field, message.into()));
        }
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.errors
            .iter()
            .find(|(name, _)| *name == field)
            .map(|(_, message)| message.as_str())
    }

    pub fn has(&self, field: &str) -> bool {
        self.get(field).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.errors.iter().map(|(field, message)| (*field, message.as_str()))
    }

    fn into_result<T>(self, value: T) -> Result<T, FormErrors> {
        if self.is_empty() {
            Ok(value)
        } else {
            Err(self)
        }
    }
}

fn check_required(errors: &mut FormErrors, field: &'static str, value: &str) -> bool {
    if value.trim().is_empty() {
        errors.add(field, REQUIRED);
        false
    } else {
        true
    }
}

fn check_length(errors: &mut FormErrors, field: &'static str, value: &str, min: usize, max: usize) {
    if !check_required(errors, field, value) {
        return;
    }
    let len = value.trim().chars().count();
    if len < min || len > max {
        errors.add(
            field,
            format!("Field must be between {min} and {max} characters long."),
        );
    }
}

fn check_email(errors: &mut FormErrors, field: &'static str, value: &str) {
    if !check_required(errors, field, value) {
        return;
    }
    let value = value.trim();
    if value.len() > MAX_EMAIL_LEN || !EMAIL_PATTERN.is_match(value) {
        errors.add(field, "Invalid email address.");
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct RegistrationForm {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub csrf_token: String,
}

impl RegistrationForm {
    pub fn validate(&self) -> Result<CreateUserRequest, FormErrors> {
        let mut errors = FormErrors::new();

        check_length(&mut errors, "full_name", &self.full_name, 2, 100);
        check_length(&mut errors, "username", &self.username, 2, 20);
        check_email(&mut errors, "email", &self.email);
        check_required(&mut errors, "password", &self.password);
        if check_required(&mut errors, "confirm_password", &self.confirm_password)
            && self.confirm_password != self.password
        {
            errors.add("confirm_password", "Passwords must match.");
        }

        errors.into_result(CreateUserRequest {
            full_name: self.full_name.trim().to_string(),
            username: self.username.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
    pub csrf_token: String,
}

impl LoginForm {
    pub fn validate(&self) -> Result<LoginRequest, FormErrors> {
        let mut errors = FormErrors::new();

        check_email(&mut errors, "email", &self.email);
        check_required(&mut errors, "password", &self.password);

        errors.into_result(LoginRequest {
            email: self.email.trim().to_string(),
            password: self.password.clone(),
        })
    }
}

/// Profile form as read from the multipart body.
#[derive(Debug, Default, Clone)]
pub struct ProfileForm {
    pub full_name: String,
    pub username: String,
    pub email: String,
    pub bio: String,
    pub picture: Option<PictureUpload>,
    pub csrf_token: String,
}

impl ProfileForm {
    pub fn validate(&self) -> Result<ProfileUpdate, FormErrors> {
        let mut errors = FormErrors::new();

        check_length(&mut errors, "full_name", &self.full_name, 2, 100);
        check_length(&mut errors, "username", &self.username, 2, 20);
        check_email(&mut errors, "email", &self.email);
        if let Some(picture) = &self.picture {
            if allowed_extension(&picture.filename).is_none() {
                errors.add("picture", "File does not have an approved extension: jpg, png, jpeg");
            }
        }

        let bio = self.bio.trim();
        errors.into_result(ProfileUpdate {
            full_name: self.full_name.trim().to_string(),
            username: self.username.trim().to_string(),
            email: self.email.trim().to_string(),
            bio: (!bio.is_empty()).then(|| bio.to_string()),
            picture: self.picture.clone(),
        })
    }
}
