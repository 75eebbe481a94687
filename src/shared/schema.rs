diesel::table! {
    users (external_id) {
        external_id -> Text,
        email -> Text,
        first_name -> Text,
        last_name -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    organizations (external_id) {
        external_id -> Text,
        name -> Text,
        slug -> Nullable<Text>,
        created_by -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    memberships (user_id, organization_id) {
        user_id -> Text,
        organization_id -> Text,
        role -> Text,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    leads (id) {
        id -> Uuid,
        organization_id -> Text,
        name -> Text,
        contact_email -> Nullable<Text>,
        status -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    lead_notes (id) {
        id -> Uuid,
        lead_id -> Uuid,
        created_by -> Text,
        content -> Text,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    org_invitations (id) {
        id -> Uuid,
        organization_id -> Text,
        email -> Text,
        role -> Text,
        invited_by -> Text,
        status -> Text,
        created_at -> Timestamptz,
    }
}

diesel::joinable!(organizations -> users (created_by));
diesel::joinable!(memberships -> users (user_id));
diesel::joinable!(memberships -> organizations (organization_id));
diesel::joinable!(leads -> organizations (organization_id));
diesel::joinable!(lead_notes -> leads (lead_id));
diesel::joinable!(lead_notes -> users (created_by));
diesel::joinable!(org_invitations -> organizations (organization_id));

diesel::allow_tables_to_appear_in_same_query!(
    users,
    organizations,
    memberships,
    leads,
    lead_notes,
    org_invitations,
);
