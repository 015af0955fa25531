use once_cell::sync::Lazy;
use regex::Regex;

pub const MIN_PASSWORD_LEN: usize = 8;
pub const PASSWORD_SPECIAL_CHARACTERS: &str = "!@#$%^&*(),.?\":{}|<>";

static EMAIL_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern"));

pub fn is_email_shaped(email: &str) -> bool {
    EMAIL_SHAPE.is_match(email)
}

pub fn sign_in_allowed(email: &str, password: &str) -> bool {
    !email.trim().is_empty() && !password.is_empty()
}

pub fn reset_password_allowed(email: &str) -> bool {
    !email.trim().is_empty() && is_email_shaped(email.trim())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PasswordChecklist {
    pub has_length: bool,
    pub has_uppercase: bool,
    pub has_lowercase: bool,
    pub has_number: bool,
    pub has_special: bool,
    pub passwords_match: bool,
}

impl PasswordChecklist {
    pub fn evaluate(password: &str, confirm: &str) -> Self {
        Self {
            has_length: password.chars().count() >= MIN_PASSWORD_LEN,
            has_uppercase: password.chars().any(|c| c.is_ascii_uppercase()),
            has_lowercase: password.chars().any(|c| c.is_ascii_lowercase()),
            has_number: password.chars().any(|c| c.is_ascii_digit()),
            has_special: password
                .chars()
                .any(|c| PASSWORD_SPECIAL_CHARACTERS.contains(c)),
            passwords_match: !password.is_empty() && password == confirm,
        }
    }

    pub fn is_satisfied(&self) -> bool {
        self.has_length
            && self.has_uppercase
            && self.has_lowercase
            && self.has_number
            && self.has_special
            && self.passwords_match
    }

    pub fn unmet(&self) -> Vec<&'static str> {
        [
            (self.has_length, "at least 8 characters"),
            (self.has_uppercase, "an uppercase letter"),
            (self.has_lowercase, "a lowercase letter"),
            (self.has_number, "a number"),
            (self.has_special, "a special character"),
            (self.passwords_match, "matching confirmation"),
        ]
        .into_iter()
        .filter_map(|(met, label)| (!met).then_some(label))
        .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignUpCheck {
    pub email_valid: bool,
    pub password: PasswordChecklist,
}

impl SignUpCheck {
    pub fn evaluate(email: &str, password: &str, confirm: &str) -> Self {
        Self {
            email_valid: is_email_shaped(email),
            password: PasswordChecklist::evaluate(password, confirm),
        }
    }

    pub fn enabled(&self) -> bool {
        self.email_valid && self.password.is_satisfied()
    }

    pub fn blocking_reason(&self) -> Option<String> {
        if self.enabled() {
            return None;
        }
        let mut reasons = Vec::new();
        if !self.email_valid {
            reasons.push("a valid email address".to_string());
        }
        let unmet = self.password.unmet();
        if !unmet.is_empty() {
            reasons.push(format!("a password with {}", unmet.join(", ")));
        }
        Some(format!("Sign-up requires {}", reasons.join(" and ")))
    }
}

pub fn sign_up_enabled(email: &str, password: &str, confirm: &str) -> bool {
    SignUpCheck::evaluate(email, password, confirm).enabled()
}
