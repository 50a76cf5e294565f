use serde::{Deserialize, Deserializer, Serialize};
use time::format_description::well_known::Rfc3339;
use time::Date;
use uuid::Uuid;

use super::repo::Profile;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProfileInput {
    pub first_name: String,
    pub last_name: String,
    /// YYYY-MM-DD
    pub birthday: String,
    pub gender: String,
    pub avatar_url: Option<String>,
}

/// Partial update. Nullable columns use `Option<Option<_>>` so the payload
/// can distinguish "leave unchanged" (field absent) from "clear" (explicit
/// null).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileInput {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub birthday: Option<String>,
    pub gender: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    pub phone_number: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub avatar_url: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub bio: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub marital_status: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    pub anniversary: Option<Option<String>>,
    pub address: Option<AddressInput>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput {
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
}

/// Present-but-null deserializes to `Some(None)`; an absent field stays
/// `None` via `#[serde(default)]`.
fn double_option<'de, T, D>(de: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(de).map(Some)
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub birthday: String,
    pub gender: String,
    pub display_name: String,
    pub phone_number: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub marital_status: Option<String>,
    pub anniversary: Option<String>,
    pub address_id: Option<Uuid>,
    pub onboarding_complete: bool,
    pub created_at: String,
    pub updated_at: String,
}

fn date_string(d: Date) -> String {
    format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
}

impl From<&Profile> for ProfileResponse {
    fn from(p: &Profile) -> Self {
        Self {
            id: p.id,
            user_id: p.user_id,
            first_name: p.first_name.clone(),
            last_name: p.last_name.clone(),
            birthday: date_string(p.birthday),
            gender: p.gender.clone(),
            display_name: p.display_name.clone(),
            phone_number: p.phone_number.clone(),
            avatar_url: p.avatar_url.clone(),
            bio: p.bio.clone(),
            marital_status: p.marital_status.clone(),
            anniversary: p.anniversary.map(date_string),
            address_id: p.address_id,
            onboarding_complete: p.onboarding_complete,
            created_at: p.created_at.format(&Rfc3339).unwrap_or_default(),
            updated_at: p.updated_at.format(&Rfc3339).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_and_null_fields_are_distinguished() {
        let input: UpdateProfileInput = serde_json::from_str(r#"{"bio": null}"#).unwrap();
        assert_eq!(input.bio, Some(None));
        assert_eq!(input.phone_number, None);

        let input: UpdateProfileInput =
            serde_json::from_str(r#"{"phoneNumber": "+1 555 0100"}"#).unwrap();
        assert_eq!(input.phone_number, Some(Some("+1 555 0100".to_string())));
    }

    #[test]
    fn dates_render_as_plain_calendar_strings() {
        use time::{Date, Month};
        let d = Date::from_calendar_date(1990, Month::June, 5).unwrap();
        assert_eq!(date_string(d), "1990-06-05");
    }
}
