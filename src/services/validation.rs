//! Field validation rules
//!
//! Failures are collected per field into [`FieldErrors`] so a single response
//! can report every problem with a request body at once.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeMap;

pub const REQUIRED: &str = "This field is required.";
pub const NOT_UNIQUE: &str = "This field must be unique.";
pub const INVALID_EMAIL: &str = "Enter a valid email address.";
pub const BLANK: &str = "This field may not be blank.";

/// Maximum email length accepted at registration
pub const MAX_EMAIL_LENGTH: usize = 254;

static EMAIL_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[A-Za-z0-9!#$%&'*+/=?^_`{|}~-]+)*@([A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?\.)+[A-Za-z]{2,63}$",
    )
    .expect("email regex is valid")
});

/// Per-field validation messages, keyed by field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Errors for a single field
    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn extend(&mut self, field: &str, messages: impl IntoIterator<Item = String>) {
        for message in messages {
            self.add(field, message);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    #[cfg(test)]
    pub(crate) fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// `Ok(())` when empty, otherwise the collected errors
    pub fn into_result(self) -> Result<(), FieldErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let parts: Vec<String> = self
            .0
            .iter()
            .map(|(field, messages)| format!("{}: {}", field, messages.join(" ")))
            .collect();
        write!(f, "{}", parts.join("; "))
    }
}

/// Check email well-formedness. Uniqueness needs the database and is checked
/// by the user service.
pub fn validate_email(email: &str) -> Result<(), String> {
    if email.len() > MAX_EMAIL_LENGTH || !EMAIL_REGEX.is_match(email) {
        return Err(INVALID_EMAIL.to_string());
    }
    Ok(())
}

/// Check a first or last name: required and purely alphabetic.
///
/// `label` is the human name of the field, e.g. "First name".
pub fn validate_name(label: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} is required", label));
    }
    if !value.chars().all(char::is_alphabetic) {
        return Err(format!("{} must be alphabetic", label));
    }
    Ok(())
}

/// Passwords rejected outright regardless of length
const COMMON_PASSWORDS: &[&str] = &[
    "123456", "12345678", "123456789", "1234567890", "password", "password1", "password12",
    "password123", "passw0rd", "qwerty", "qwerty123", "qwertyuiop", "abc123", "abcd1234",
    "111111", "000000", "iloveyou", "letmein", "welcome", "welcome1", "monkey", "dragon",
    "football", "baseball", "sunshine", "princess", "shadow", "superman", "trustno1",
    "master", "michael", "jennifer", "hunter2", "admin", "admin123", "administrator",
    "login", "starwars", "whatever", "freedom", "charlie", "donald", "batman", "zaq12wsx",
    "1q2w3e4r", "1qaz2wsx", "qazwsx", "asdfghjkl", "asdfgh", "changeme", "secret",
    "mustang", "access", "flower", "hello123", "loveme", "ninja", "azerty", "solo",
    "computer", "internet", "samsung", "google", "matrix", "pokemon", "liverpool",
    "chelsea", "arsenal", "11111111", "12341234", "987654321", "666666", "121212",
    "7777777", "555555", "654321", "1111111", "123123", "123321", "qwerty1", "letmein1",
];

/// Password strength rules applied at registration.
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    pub min_length: usize,
    /// Similarity ratio (0..=1) at or above which a password is considered
    /// too close to one of the user's attributes
    pub max_similarity: f64,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 8,
            max_similarity: 0.7,
        }
    }
}

impl PasswordPolicy {
    pub fn with_min_length(min_length: usize) -> Self {
        Self {
            min_length,
            ..Self::default()
        }
    }

    /// Run every rule and return all failure messages.
    ///
    /// `attributes` pairs a human label ("email address") with the user's
    /// value for it.
    pub fn validate(&self, password: &str, attributes: &[(&str, &str)]) -> Result<(), Vec<String>> {
        let mut messages = Vec::new();

        if password.chars().count() < self.min_length {
            let unit = if self.min_length == 1 { "character" } else { "characters" };
            messages.push(format!(
                "This password is too short. It must contain at least {} {}.",
                self.min_length, unit
            ));
        }

        if let Some(label) = self.similar_attribute(password, attributes) {
            messages.push(format!("The password is too similar to the {}.", label));
        }

        let lowered = password.trim().to_lowercase();
        if COMMON_PASSWORDS.contains(&lowered.as_str()) {
            messages.push("This password is too common.".to_string());
        }

        if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
            messages.push("This password is entirely numeric.".to_string());
        }

        if messages.is_empty() {
            Ok(())
        } else {
            Err(messages)
        }
    }

    fn similar_attribute<'a>(&self, password: &str, attributes: &[(&'a str, &str)]) -> Option<&'a str> {
        let password = password.to_lowercase();

        attributes.iter().find_map(|(label, value)| {
            let value = value.to_lowercase();
            if value.is_empty() {
                return None;
            }

            // Email addresses are also compared part by part ("ada", "example", "com").
            let mut candidates = vec![value.clone()];
            candidates.extend(
                value
                    .split(|c: char| !c.is_alphanumeric())
                    .filter(|part| part.len() >= 3)
                    .map(str::to_string),
            );

            candidates
                .iter()
                .any(|candidate| similarity(&password, candidate) >= self.max_similarity)
                .then_some(*label)
        })
    }
}

/// Ratio of shared characters in order, `2 * lcs / (len(a) + len(b))`.
fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 0.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    2.0 * prev[b.len()] as f64 / total as f64
}
