use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use sqlx::PgPool;
use time::macros::format_description;
use time::{Date, OffsetDateTime};
use tracing::error;
use uuid::Uuid;

use crate::auth::engine::is_unique_violation;

use super::dto::{CreateProfileInput, UpdateProfileInput};
use super::repo::{self, NewProfile, Profile};

pub const GENDERS: [&str; 3] = ["male", "female", "prefer_not_to_say"];
pub const MARITAL_STATUSES: [&str; 5] =
    ["single", "married", "divorced", "widowed", "prefer_not_to_say"];

const MAX_NAME_LEN: usize = 100;
const MAX_PHONE_LEN: usize = 20;
const MAX_BIO_LEN: usize = 500;
const MIN_AGE_YEARS: i32 = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProfileErrorCode {
    ValidationError,
    ProfileExists,
    ProfileNotFound,
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProfileFailure {
    pub code: ProfileErrorCode,
    pub message: String,
}

pub type ProfileResult<T> = Result<T, ProfileFailure>;

fn invalid(message: &str) -> ProfileFailure {
    ProfileFailure {
        code: ProfileErrorCode::ValidationError,
        message: message.to_string(),
    }
}

fn failure(code: ProfileErrorCode) -> ProfileFailure {
    let message = match code {
        ProfileErrorCode::ValidationError => "Invalid profile data",
        ProfileErrorCode::ProfileExists => "Profile already exists",
        ProfileErrorCode::ProfileNotFound => "Profile not found",
        ProfileErrorCode::Unknown => "Something went wrong. Please try again.",
    };
    ProfileFailure {
        code,
        message: message.to_string(),
    }
}

fn validate_name(value: &str, field: &str) -> Result<String, ProfileFailure> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(invalid(&format!("{field} is required")));
    }
    if trimmed.len() > MAX_NAME_LEN {
        return Err(invalid(&format!("{field} is too long")));
    }
    Ok(trimmed.to_string())
}

fn validate_gender(value: &str) -> Result<String, ProfileFailure> {
    if GENDERS.contains(&value) {
        Ok(value.to_string())
    } else {
        Err(invalid("Gender must be male, female, or prefer_not_to_say"))
    }
}

fn validate_marital_status(value: &str) -> Result<String, ProfileFailure> {
    if MARITAL_STATUSES.contains(&value) {
        Ok(value.to_string())
    } else {
        Err(invalid("Invalid marital status"))
    }
}

fn validate_phone(value: &str) -> Result<String, ProfileFailure> {
    let trimmed = value.trim();
    if trimmed.len() > MAX_PHONE_LEN {
        return Err(invalid("Phone number is too long"));
    }
    Ok(trimmed.to_string())
}

fn validate_bio(value: &str) -> Result<String, ProfileFailure> {
    if value.len() > MAX_BIO_LEN {
        return Err(invalid("Bio is too long"));
    }
    Ok(value.to_string())
}

fn validate_avatar_url(value: &str) -> Result<String, ProfileFailure> {
    let ok = (value.starts_with("https://") || value.starts_with("http://"))
        && !value.contains(char::is_whitespace)
        && value.len() > "https://".len();
    if ok {
        Ok(value.to_string())
    } else {
        Err(invalid("Avatar URL must be a valid URL"))
    }
}

fn parse_date(value: &str, message: &str) -> Result<Date, ProfileFailure> {
    lazy_static! {
        static ref DATE_SHAPE: Regex = Regex::new(r"^\d{4}-\d{2}-\d{2}$").unwrap();
    }
    if !DATE_SHAPE.is_match(value) {
        return Err(invalid(message));
    }
    Date::parse(value, format_description!("[year]-[month]-[day]")).map_err(|_| invalid(message))
}

/// Same calendar day `years` back, clamped for Feb 29 on non-leap years.
fn years_ago(from: Date, years: i32) -> Date {
    let year = from.year() - years;
    Date::from_calendar_date(year, from.month(), from.day())
        .or_else(|_| Date::from_calendar_date(year, from.month(), 28))
        .unwrap_or(from)
}

fn validate_birthday(value: &str) -> Result<Date, ProfileFailure> {
    let date = parse_date(value, "Birthday must be in YYYY-MM-DD format")?;
    let today = OffsetDateTime::now_utc().date();
    if date > years_ago(today, MIN_AGE_YEARS) {
        return Err(invalid("Must be at least 13 years old"));
    }
    Ok(date)
}

fn validate_anniversary(value: &str) -> Result<Date, ProfileFailure> {
    parse_date(value, "Anniversary must be in YYYY-MM-DD format")
}

fn display_name(first: &str, last: &str) -> String {
    format!("{first} {last}")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AddressWrite {
    Reuse(Uuid),
    Create,
}

/// A profile that already links an address keeps that row; the FK is
/// ON DELETE SET NULL, so a stored id always points at a live row.
fn address_write(existing: Option<Uuid>) -> AddressWrite {
    match existing {
        Some(id) => AddressWrite::Reuse(id),
        None => AddressWrite::Create,
    }
}

#[derive(Clone)]
pub struct ProfileService {
    db: PgPool,
}

impl ProfileService {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }

    pub async fn get_by_user_id(&self, user_id: Uuid) -> ProfileResult<Option<Profile>> {
        repo::find_by_user(&self.db, user_id).await.map_err(|e| {
            error!(error = %e, %user_id, "failed to load profile");
            failure(ProfileErrorCode::Unknown)
        })
    }

    pub async fn is_onboarding_complete(&self, user_id: Uuid) -> bool {
        matches!(
            self.get_by_user_id(user_id).await,
            Ok(Some(profile)) if profile.onboarding_complete
        )
    }

    /// One-shot onboarding create. The pre-check gives a clean error on the
    /// common path; the unique index on `user_id` nets concurrent duplicates.
    pub async fn create(&self, user_id: Uuid, input: CreateProfileInput) -> ProfileResult<Profile> {
        let first_name = validate_name(&input.first_name, "First name")?;
        let last_name = validate_name(&input.last_name, "Last name")?;
        let birthday = validate_birthday(&input.birthday)?;
        let gender = validate_gender(&input.gender)?;
        let avatar_url = match input.avatar_url.as_deref() {
            Some(url) if !url.is_empty() => Some(validate_avatar_url(url)?),
            _ => None,
        };

        if self.get_by_user_id(user_id).await?.is_some() {
            return Err(failure(ProfileErrorCode::ProfileExists));
        }

        let new = NewProfile {
            user_id,
            display_name: display_name(&first_name, &last_name),
            first_name,
            last_name,
            birthday,
            gender,
            avatar_url,
        };

        repo::insert(&self.db, &new).await.map_err(|e| {
            if is_unique_violation(&e) {
                failure(ProfileErrorCode::ProfileExists)
            } else {
                error!(error = %e, %user_id, "failed to create profile");
                failure(ProfileErrorCode::Unknown)
            }
        })
    }

    /// Validates each supplied field, merges over the stored row, and writes
    /// the whole row back. `display_name` is always recomputed.
    pub async fn update(&self, user_id: Uuid, input: UpdateProfileInput) -> ProfileResult<Profile> {
        let Some(mut profile) = self.get_by_user_id(user_id).await? else {
            return Err(failure(ProfileErrorCode::ProfileNotFound));
        };

        if let Some(first) = &input.first_name {
            profile.first_name = validate_name(first, "First name")?;
        }
        if let Some(last) = &input.last_name {
            profile.last_name = validate_name(last, "Last name")?;
        }
        if let Some(birthday) = &input.birthday {
            profile.birthday = validate_birthday(birthday)?;
        }
        if let Some(gender) = &input.gender {
            profile.gender = validate_gender(gender)?;
        }
        if let Some(phone) = &input.phone_number {
            profile.phone_number = match phone.as_deref() {
                Some(p) => Some(validate_phone(p)?),
                None => None,
            };
        }
        if let Some(url) = &input.avatar_url {
            profile.avatar_url = match url.as_deref() {
                Some(u) => Some(validate_avatar_url(u)?),
                None => None,
            };
        }
        if let Some(bio) = &input.bio {
            profile.bio = match bio.as_deref() {
                Some(b) => Some(validate_bio(b)?),
                None => None,
            };
        }
        if let Some(status) = &input.marital_status {
            profile.marital_status = match status.as_deref() {
                Some(s) => Some(validate_marital_status(s)?),
                None => None,
            };
        }
        if let Some(anniversary) = &input.anniversary {
            profile.anniversary = match anniversary.as_deref() {
                Some(a) => Some(validate_anniversary(a)?),
                None => None,
            };
        }
        if let Some(address) = &input.address {
            let row = match address_write(profile.address_id) {
                AddressWrite::Reuse(id) => {
                    repo::update_address(
                        &self.db,
                        id,
                        address.line1.as_deref(),
                        address.line2.as_deref(),
                        address.city.as_deref(),
                        address.state.as_deref(),
                        address.postal_code.as_deref(),
                        address.country.as_deref(),
                    )
                    .await
                }
                AddressWrite::Create => {
                    repo::insert_address(
                        &self.db,
                        address.line1.as_deref(),
                        address.line2.as_deref(),
                        address.city.as_deref(),
                        address.state.as_deref(),
                        address.postal_code.as_deref(),
                        address.country.as_deref(),
                    )
                    .await
                }
            }
            .map_err(|e| {
                error!(error = %e, %user_id, "failed to save address");
                failure(ProfileErrorCode::Unknown)
            })?;
            profile.address_id = Some(row.id);
        }

        profile.display_name = display_name(&profile.first_name, &profile.last_name);

        repo::update(&self.db, &profile).await.map_err(|e| {
            error!(error = %e, %user_id, "failed to update profile");
            failure(ProfileErrorCode::Unknown)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_are_trimmed_and_bounded() {
        assert_eq!(validate_name("  Ada  ", "First name").unwrap(), "Ada");
        assert_eq!(
            validate_name("   ", "First name").unwrap_err().message,
            "First name is required"
        );
        assert_eq!(
            validate_name(&"x".repeat(101), "Last name")
                .unwrap_err()
                .message,
            "Last name is too long"
        );
    }

    #[test]
    fn birthday_shape_and_minimum_age() {
        assert_eq!(
            validate_birthday("1990-6-5").unwrap_err().message,
            "Birthday must be in YYYY-MM-DD format"
        );
        assert_eq!(
            validate_birthday("1990-13-40").unwrap_err().message,
            "Birthday must be in YYYY-MM-DD format"
        );
        assert!(validate_birthday("1990-06-05").is_ok());

        let today = OffsetDateTime::now_utc().date();
        let twelve = years_ago(today, 12);
        let err = validate_birthday(&format!(
            "{:04}-{:02}-{:02}",
            twelve.year(),
            u8::from(twelve.month()),
            twelve.day()
        ))
        .unwrap_err();
        assert_eq!(err.message, "Must be at least 13 years old");
    }

    #[test]
    fn years_ago_clamps_leap_day() {
        use time::Month;
        let leap = Date::from_calendar_date(2024, Month::February, 29).unwrap();
        let back = years_ago(leap, 13);
        assert_eq!(back, Date::from_calendar_date(2011, Month::February, 28).unwrap());
    }

    #[test]
    fn gender_and_marital_status_are_closed_sets() {
        assert!(validate_gender("male").is_ok());
        assert!(validate_gender("prefer_not_to_say").is_ok());
        assert_eq!(
            validate_gender("other").unwrap_err().message,
            "Gender must be male, female, or prefer_not_to_say"
        );
        assert!(validate_marital_status("married").is_ok());
        assert!(validate_marital_status("complicated").is_err());
    }

    #[test]
    fn avatar_url_must_look_like_a_url() {
        assert!(validate_avatar_url("https://cdn.example.com/a.png").is_ok());
        assert!(validate_avatar_url("ftp://example.com/a.png").is_err());
        assert!(validate_avatar_url("https://bad url").is_err());
        assert!(validate_avatar_url("https://").is_err());
    }

    #[test]
    fn display_name_joins_first_and_last() {
        assert_eq!(display_name("Ada", "Lovelace"), "Ada Lovelace");
    }

    #[test]
    fn address_updates_reuse_the_linked_row() {
        let id = Uuid::new_v4();
        assert_eq!(address_write(Some(id)), AddressWrite::Reuse(id));
        assert_eq!(address_write(None), AddressWrite::Create);
    }
}
