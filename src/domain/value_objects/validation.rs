use std::{collections::BTreeMap, fmt::Display, str::FromStr};

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::domain::{
    entities::{
        milestones::{MilestoneChanges, NewMilestone},
        payment_requests::NewPaymentRequest,
    },
    value_objects::money::format_usd,
};

pub const TITLE_MIN_CHARS: usize = 3;
pub const TITLE_MAX_CHARS: usize = 100;
pub const DESCRIPTION_MIN_CHARS: usize = 10;
pub const DESCRIPTION_MAX_CHARS: usize = 500;

/// Field-keyed validation messages. Empty means the form is valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(BTreeMap<&'static str, String>);

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.insert(field, message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, &str)> {
        self.0.iter().map(|(field, message)| (*field, message.as_str()))
    }
}

impl Display for ValidationErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (idx, (field, message)) in self.iter().enumerate() {
            if idx > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
        }
        Ok(())
    }
}

/// Raw milestone form input as typed by the professional.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MilestoneForm {
    pub title: String,
    pub description: String,
    pub amount: String,
    pub due_date: String,
}

/// Raw payment request form input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequestForm {
    pub amount: String,
    pub description: String,
    #[serde(default)]
    pub notes: String,
}

pub fn validate_milestone_create(
    form: &MilestoneForm,
    remaining_contract_amount: Decimal,
    today: NaiveDate,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    check_title(&mut errors, &form.title, None);
    check_description(&mut errors, &form.description, None);
    check_amount(
        &mut errors,
        &form.amount,
        remaining_contract_amount,
        |ceiling| format!("Amount cannot exceed remaining budget: {}", format_usd(ceiling)),
    );
    check_due_date(&mut errors, &form.due_date, today);

    errors
}

pub fn validate_milestone_edit(
    form: &MilestoneForm,
    other_milestones_total: Decimal,
    contract_total: Decimal,
    today: NaiveDate,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    check_title(&mut errors, &form.title, Some(TITLE_MAX_CHARS));
    check_description(&mut errors, &form.description, Some(DESCRIPTION_MAX_CHARS));
    check_amount(
        &mut errors,
        &form.amount,
        contract_total - other_milestones_total,
        |ceiling| {
            format!(
                "Amount cannot exceed remaining contract value ({})",
                format_usd(ceiling)
            )
        },
    );
    check_due_date(&mut errors, &form.due_date, today);

    errors
}

pub fn validate_payment_request(
    form: &PaymentRequestForm,
    milestone_amount: Decimal,
) -> ValidationErrors {
    let mut errors = ValidationErrors::new();

    let description = form.description.trim();
    if description.is_empty() {
        errors.insert(
            "description",
            "Please provide a description for the payment request",
        );
    } else if description.chars().count() < DESCRIPTION_MIN_CHARS {
        errors.insert(
            "description",
            "Description must be at least 10 characters long",
        );
    }

    check_amount(&mut errors, &form.amount, milestone_amount, |_| {
        "Amount cannot exceed milestone amount".to_string()
    });

    errors
}

/// Validates a create form and converts it into the payload sent to the backend.
pub fn new_milestone_from_form(
    form: &MilestoneForm,
    remaining_contract_amount: Decimal,
    today: NaiveDate,
    order: i32,
) -> Result<NewMilestone, ValidationErrors> {
    let errors = validate_milestone_create(form, remaining_contract_amount, today);
    let (amount, due_date) = typed_fields(form, errors)?;

    Ok(NewMilestone {
        title: form.title.trim().to_string(),
        description: form.description.trim().to_string(),
        amount,
        due_date,
        order,
    })
}

/// Validates an edit form and converts it into the update payload.
pub fn milestone_changes_from_form(
    form: &MilestoneForm,
    other_milestones_total: Decimal,
    contract_total: Decimal,
    today: NaiveDate,
) -> Result<MilestoneChanges, ValidationErrors> {
    let errors = validate_milestone_edit(form, other_milestones_total, contract_total, today);
    let (amount, due_date) = typed_fields(form, errors)?;

    Ok(MilestoneChanges {
        title: form.title.trim().to_string(),
        description: form.description.trim().to_string(),
        amount,
        due_date,
    })
}

pub fn payment_request_from_form(
    form: &PaymentRequestForm,
    milestone_amount: Decimal,
) -> Result<NewPaymentRequest, ValidationErrors> {
    let mut errors = validate_payment_request(form, milestone_amount);
    if !errors.is_empty() {
        return Err(errors);
    }

    let Some(amount) = parse_amount(&form.amount) else {
        errors.insert("amount", "Amount is required");
        return Err(errors);
    };

    let notes = form.notes.trim();
    Ok(NewPaymentRequest {
        amount,
        description: form.description.trim().to_string(),
        notes: (!notes.is_empty()).then(|| notes.to_string()),
    })
}

fn typed_fields(
    form: &MilestoneForm,
    mut errors: ValidationErrors,
) -> Result<(Decimal, NaiveDate), ValidationErrors> {
    if !errors.is_empty() {
        return Err(errors);
    }

    match (parse_amount(&form.amount), parse_date(&form.due_date)) {
        (Some(amount), Some(due_date)) => Ok((amount, due_date)),
        (amount, due_date) => {
            if amount.is_none() {
                errors.insert("amount", "Amount is required");
            }
            if due_date.is_none() {
                errors.insert("due_date", "Due date is required");
            }
            Err(errors)
        }
    }
}

fn check_title(errors: &mut ValidationErrors, raw: &str, max: Option<usize>) {
    let title = raw.trim();
    let len = title.chars().count();
    if title.is_empty() {
        errors.insert("title", "Title is required");
    } else if len < TITLE_MIN_CHARS {
        errors.insert("title", "Title must be at least 3 characters long");
    } else if max.is_some_and(|max| len > max) {
        errors.insert("title", "Title must be less than 100 characters");
    }
}

fn check_description(errors: &mut ValidationErrors, raw: &str, max: Option<usize>) {
    let description = raw.trim();
    let len = description.chars().count();
    if description.is_empty() {
        errors.insert("description", "Description is required");
    } else if len < DESCRIPTION_MIN_CHARS {
        errors.insert(
            "description",
            "Description must be at least 10 characters long",
        );
    } else if max.is_some_and(|max| len > max) {
        errors.insert("description", "Description must be less than 500 characters");
    }
}

fn check_amount(
    errors: &mut ValidationErrors,
    raw: &str,
    ceiling: Decimal,
    over_ceiling: impl FnOnce(Decimal) -> String,
) {
    match parse_amount(raw) {
        None => errors.insert("amount", "Amount is required"),
        Some(amount) if amount <= Decimal::ZERO => {
            errors.insert("amount", "Amount must be greater than 0")
        }
        Some(amount) if amount > ceiling => errors.insert("amount", over_ceiling(ceiling)),
        Some(_) => {}
    }
}

fn check_due_date(errors: &mut ValidationErrors, raw: &str, today: NaiveDate) {
    if raw.trim().is_empty() {
        errors.insert("due_date", "Due date is required");
        return;
    }
    match parse_date(raw) {
        None => errors.insert("due_date", "Due date must be a valid date (YYYY-MM-DD)"),
        Some(due_date) if due_date < today => {
            errors.insert("due_date", "Due date cannot be in the past")
        }
        Some(_) => {}
    }
}

fn parse_amount(raw: &str) -> Option<Decimal> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    Decimal::from_str(raw)
        .or_else(|_| Decimal::from_scientific(raw))
        .ok()
}

fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}
