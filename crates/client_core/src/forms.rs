//! Client-side validation of workspace and layer forms.
//!
//! Drafts are validated before anything is sent; a draft that fails here never
//! reaches the backend.

use shared::{
    domain::{BoundingBox, DEFAULT_RESOLUTION, MAX_RESOLUTION, MIN_RESOLUTION},
    protocol::{
        CreateLayerRequest, CreateWorkspaceRequest, LoginRequest, SignupRequest, TagFilter,
        UpdateLayerRequest, UpdateWorkspaceRequest,
    },
};

use crate::error::FormErrors;

const MAX_NAME_LEN: usize = 255;
const MAX_LAYER_TYPE_LEN: usize = 100;
const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SignupDraft {
    pub email: String,
    pub password: String,
    pub full_name: String,
}

impl SignupDraft {
    pub fn validate(&self) -> Result<SignupRequest, FormErrors> {
        let mut errors = FormErrors::default();
        let email = check_email(&mut errors, &self.email);
        if self.password.chars().count() < MIN_PASSWORD_LEN {
            errors.push(
                "password",
                format!("password must be at least {MIN_PASSWORD_LEN} characters"),
            );
        }
        let full_name = check_name(&mut errors, "full_name", &self.full_name, MAX_NAME_LEN);
        errors.into_result(SignupRequest {
            email,
            password: self.password.clone(),
            full_name,
        })
    }
}

pub fn validate_login(email: &str, password: &str) -> Result<LoginRequest, FormErrors> {
    let mut errors = FormErrors::default();
    let email = check_email(&mut errors, email);
    if password.is_empty() {
        errors.push("password", "password is required");
    }
    errors.into_result(LoginRequest {
        email,
        password: password.to_string(),
    })
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceDraft {
    pub name: String,
    pub description: Option<String>,
}

impl WorkspaceDraft {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn validate(&self) -> Result<CreateWorkspaceRequest, FormErrors> {
        let mut errors = FormErrors::default();
        let name = check_name(&mut errors, "name", &self.name, MAX_NAME_LEN);
        errors.into_result(CreateWorkspaceRequest {
            name,
            description: normalize_optional(self.description.as_deref()),
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkspaceEdit {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl WorkspaceEdit {
    pub fn validate(&self) -> Result<UpdateWorkspaceRequest, FormErrors> {
        let mut errors = FormErrors::default();
        let name = self
            .name
            .as_deref()
            .map(|name| check_name(&mut errors, "name", name, MAX_NAME_LEN));
        if name.is_none() && self.description.is_none() {
            errors.fields.push(crate::error::FieldError {
                field: None,
                message: "nothing to update".to_string(),
            });
        }
        errors.into_result(UpdateWorkspaceRequest {
            name,
            description: self.description.as_ref().map(|d| d.trim().to_string()),
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerDraft {
    pub name: String,
    pub layer_type: String,
    pub tags: TagFilter,
    pub bbox: [f64; 4],
    pub resolution: i64,
}

impl Default for LayerDraft {
    fn default() -> Self {
        Self {
            name: String::new(),
            layer_type: String::new(),
            tags: TagFilter::new(),
            bbox: [0.0; 4],
            resolution: i64::from(DEFAULT_RESOLUTION),
        }
    }
}

impl LayerDraft {
    pub fn validate(&self) -> Result<CreateLayerRequest, FormErrors> {
        let mut errors = FormErrors::default();
        let name = check_name(&mut errors, "name", &self.name, MAX_NAME_LEN);
        let layer_type = check_name(&mut errors, "layer_type", &self.layer_type, MAX_LAYER_TYPE_LEN);

        let mut tags = TagFilter::new();
        if self.tags.is_empty() {
            errors.push("tags", "at least one OSM tag filter is required");
        }
        for (key, value) in &self.tags {
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                errors.push("tags", "tag keys and values must not be empty");
                continue;
            }
            tags.insert(key.to_string(), value.to_string());
        }

        check_bbox(&mut errors, self.bbox);

        let resolution = u8::try_from(self.resolution)
            .ok()
            .filter(|r| (MIN_RESOLUTION..=MAX_RESOLUTION).contains(r));
        if resolution.is_none() {
            errors.push(
                "resolution",
                format!(
                    "resolution must be between {MIN_RESOLUTION} and {MAX_RESOLUTION}, got {}",
                    self.resolution
                ),
            );
        }

        errors.into_result(CreateLayerRequest {
            name,
            layer_type,
            tags,
            bbox: BoundingBox::from(self.bbox),
            resolution: resolution.unwrap_or(DEFAULT_RESOLUTION),
        })
    }
}

pub fn validate_layer_rename(name: &str) -> Result<UpdateLayerRequest, FormErrors> {
    let mut errors = FormErrors::default();
    let name = check_name(&mut errors, "name", name, MAX_NAME_LEN);
    errors.into_result(UpdateLayerRequest { name: Some(name) })
}

/// Parses `key=value` into a tag filter entry.
pub fn parse_tag(raw: &str) -> Result<(String, String), FormErrors> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() && !value.trim().is_empty() => {
            Ok((key.trim().to_string(), value.trim().to_string()))
        }
        _ => {
            let mut errors = FormErrors::default();
            errors.push("tags", format!("expected key=value, got {raw:?}"));
            Err(errors)
        }
    }
}

/// Parses `min_lat,min_lon,max_lat,max_lon`.
pub fn parse_bbox(raw: &str) -> Result<[f64; 4], FormErrors> {
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let parsed: Option<Vec<f64>> = parts.iter().map(|part| part.parse::<f64>().ok()).collect();
    match parsed.as_deref() {
        Some(&[min_lat, min_lon, max_lat, max_lon]) => Ok([min_lat, min_lon, max_lat, max_lon]),
        _ => {
            let mut errors = FormErrors::default();
            errors.push(
                "bbox",
                format!("expected four comma-separated numbers min_lat,min_lon,max_lat,max_lon, got {raw:?}"),
            );
            Err(errors)
        }
    }
}

fn check_name(errors: &mut FormErrors, field: &str, raw: &str, max_len: usize) -> String {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        errors.push(field, format!("{field} is required"));
    } else if trimmed.chars().count() > max_len {
        errors.push(field, format!("{field} must be at most {max_len} characters"));
    }
    trimmed.to_string()
}

fn check_email(errors: &mut FormErrors, raw: &str) -> String {
    let email = raw.trim();
    let well_formed = email
        .split_once('@')
        .is_some_and(|(local, domain)| {
            !local.is_empty() && domain.contains('.') && !domain.starts_with('.') && !domain.ends_with('.')
        });
    if !well_formed {
        errors.push("email", "enter a valid email address");
    }
    email.to_string()
}

fn check_bbox(errors: &mut FormErrors, bbox: [f64; 4]) {
    let [min_lat, min_lon, max_lat, max_lon] = bbox;
    if bbox.iter().any(|coord| !coord.is_finite()) {
        errors.push("bbox", "coordinates must be finite numbers");
        return;
    }
    if !(-90.0..=90.0).contains(&min_lat) || !(-90.0..=90.0).contains(&max_lat) {
        errors.push("bbox", "latitude must be within [-90, 90]");
    } else if min_lat >= max_lat {
        errors.push("bbox", "min latitude must be less than max latitude");
    }
    if !(-180.0..=180.0).contains(&min_lon) || !(-180.0..=180.0).contains(&max_lon) {
        errors.push("bbox", "longitude must be within [-180, 180]");
    } else if min_lon >= max_lon {
        errors.push("bbox", "min longitude must be less than max longitude");
    }
}

fn normalize_optional(raw: Option<&str>) -> Option<String> {
    raw.map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}
