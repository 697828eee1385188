diesel::table! {
    notifications (id) {
        id -> Text,
        user_id -> Text,
        #[sql_name = "type"]
        type_ -> Text,
        title -> Text,
        message -> Text,
        data -> Jsonb,
        link -> Nullable<Text>,
        priority -> Text,
        is_read -> Bool,
        read_at -> Nullable<Timestamptz>,
        created_at -> Timestamptz,
    }
}

diesel::table! {
    notification_preferences (user_id) {
        user_id -> Text,
        email_enabled -> Bool,
        push_enabled -> Bool,
        type_flags -> Jsonb,
        created_at -> Timestamptz,
        updated_at -> Timestamptz,
    }
}

diesel::allow_tables_to_appear_in_same_query!(notifications, notification_preferences);
