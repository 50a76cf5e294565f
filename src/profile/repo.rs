use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use time::{Date, OffsetDateTime};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Profile {
    pub id: Uuid,
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub birthday: Date,
    pub gender: String,
    pub display_name: String,
    pub phone_number: Option<String>,
    pub avatar_url: Option<String>,
    pub bio: Option<String>,
    pub marital_status: Option<String>,
    pub anniversary: Option<Date>,
    pub address_id: Option<Uuid>,
    pub onboarding_complete: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Address {
    pub id: Uuid,
    pub line1: Option<String>,
    pub line2: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub postal_code: Option<String>,
    pub country: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

/// Validated values for the initial insert. `display_name` is derived by the
/// service, `onboarding_complete` is set true by the insert itself.
#[derive(Debug)]
pub struct NewProfile {
    pub user_id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub birthday: Date,
    pub gender: String,
    pub display_name: String,
    pub avatar_url: Option<String>,
}

const PROFILE_COLUMNS: &str = "id, user_id, first_name, last_name, birthday, gender, display_name, \
     phone_number, avatar_url, bio, marital_status, anniversary, address_id, onboarding_complete, \
     created_at, updated_at";

pub async fn find_by_user(db: &PgPool, user_id: Uuid) -> Result<Option<Profile>, sqlx::Error> {
    sqlx::query_as::<_, Profile>(&format!(
        "SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1"
    ))
    .bind(user_id)
    .fetch_optional(db)
    .await
}

pub async fn insert(db: &PgPool, new: &NewProfile) -> Result<Profile, sqlx::Error> {
    sqlx::query_as::<_, Profile>(&format!(
        "INSERT INTO profiles (user_id, first_name, last_name, birthday, gender, display_name, avatar_url, onboarding_complete) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, TRUE) \
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(new.user_id)
    .bind(&new.first_name)
    .bind(&new.last_name)
    .bind(new.birthday)
    .bind(&new.gender)
    .bind(&new.display_name)
    .bind(&new.avatar_url)
    .fetch_one(db)
    .await
}

/// Full-row write of a merged profile. The service owns the merge so the
/// repo does not need per-field dynamic SQL.
pub async fn update(db: &PgPool, profile: &Profile) -> Result<Profile, sqlx::Error> {
    sqlx::query_as::<_, Profile>(&format!(
        "UPDATE profiles SET first_name = $2, last_name = $3, birthday = $4, gender = $5, \
         display_name = $6, phone_number = $7, avatar_url = $8, bio = $9, marital_status = $10, \
         anniversary = $11, address_id = $12, updated_at = now() \
         WHERE user_id = $1 \
         RETURNING {PROFILE_COLUMNS}"
    ))
    .bind(profile.user_id)
    .bind(&profile.first_name)
    .bind(&profile.last_name)
    .bind(profile.birthday)
    .bind(&profile.gender)
    .bind(&profile.display_name)
    .bind(&profile.phone_number)
    .bind(&profile.avatar_url)
    .bind(&profile.bio)
    .bind(&profile.marital_status)
    .bind(profile.anniversary)
    .bind(profile.address_id)
    .fetch_one(db)
    .await
}

pub async fn update_address(
    db: &PgPool,
    id: Uuid,
    line1: Option<&str>,
    line2: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
    postal_code: Option<&str>,
    country: Option<&str>,
) -> Result<Address, sqlx::Error> {
    sqlx::query_as::<_, Address>(
        "UPDATE addresses SET line1 = $2, line2 = $3, city = $4, state = $5, postal_code = $6, \
         country = $7, updated_at = now() \
         WHERE id = $1 \
         RETURNING id, line1, line2, city, state, postal_code, country, created_at, updated_at",
    )
    .bind(id)
    .bind(line1)
    .bind(line2)
    .bind(city)
    .bind(state)
    .bind(postal_code)
    .bind(country)
    .fetch_one(db)
    .await
}

pub async fn insert_address(
    db: &PgPool,
    line1: Option<&str>,
    line2: Option<&str>,
    city: Option<&str>,
    state: Option<&str>,
    postal_code: Option<&str>,
    country: Option<&str>,
) -> Result<Address, sqlx::Error> {
    sqlx::query_as::<_, Address>(
        "INSERT INTO addresses (line1, line2, city, state, postal_code, country) \
         VALUES ($1, $2, $3, $4, $5, $6) \
         RETURNING id, line1, line2, city, state, postal_code, country, created_at, updated_at",
    )
    .bind(line1)
    .bind(line2)
    .bind(city)
    .bind(state)
    .bind(postal_code)
    .bind(country)
    .fetch_one(db)
    .await
}
