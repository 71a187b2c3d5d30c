//! Diesel table definitions for the PostgreSQL schema.
//!
//! These definitions must match `backend/migrations` exactly. When a
//! migration changes a table, regenerate this file with
//! `diesel print-schema` or update it by hand.

diesel::table! {
    /// Child profiles owned by a user.
    children (id) {
        id -> Uuid,
        owner_id -> Uuid,
        name -> Nullable<Text>,
        age -> Nullable<Int2>,
        gender -> Nullable<Text>,
        interests -> Array<Text>,
        friends -> Array<Text>,
        favorite_characters -> Array<Text>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    /// One pipeline attempt per request id.
    ///
    /// `status` holds either the active stage name or one of `succeeded`,
    /// `unsafe`, and `failed`. The lease columns give cross-process mutual
    /// exclusion.
    generation_attempts (id) {
        id -> Uuid,
        /// Unique: the idempotency key of the submission.
        request_id -> Uuid,
        owner_id -> Uuid,
        child_id -> Uuid,
        /// Snapshot of the generation request as JSON.
        request -> Jsonb,
        /// SHA-256 of the canonical submission fingerprint.
        payload_hash -> Bytea,
        status -> Text,
        failure -> Nullable<Jsonb>,
        reason_codes -> Array<Text>,
        story_id -> Nullable<Uuid>,
        /// Stage outputs kept for resumption.
        checkpoint -> Jsonb,
        transitions -> Jsonb,
        runs -> Int4,
        lease_expires_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Committed stories. Rows are never updated.
    stories (id) {
        id -> Uuid,
        /// Unique: at most one story per request id.
        request_id -> Uuid,
        attempt_id -> Uuid,
        child_id -> Uuid,
        owner_id -> Uuid,
        title -> Text,
        story_text -> Text,
        audio_reference -> Text,
        safety_verdict -> Bool,
        word_count -> Int4,
        estimated_duration_seconds -> Int4,
        prompt_parameters_used -> Jsonb,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(generation_attempts -> children (child_id));
diesel::joinable!(stories -> generation_attempts (attempt_id));

diesel::allow_tables_to_appear_in_same_query!(children, generation_attempts, stories,);
