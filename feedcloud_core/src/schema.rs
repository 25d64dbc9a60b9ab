diesel::table! {
    user (id) {
        id -> Integer,
        username -> Text,
        password_hash -> Text,
        is_admin -> Bool,
    }
}

diesel::table! {
    feed (id) {
        id -> Integer,
        url -> Text,
        user_id -> Integer,
    }
}

diesel::table! {
    entry (id) {
        id -> Integer,
        original_id -> Text,
        title -> Text,
        summary -> Text,
        link -> Text,
        published_at -> Timestamp,
        saved_at -> Timestamp,
        status -> Text,
        feed_id -> Integer,
    }
}

diesel::table! {
    feed_update_run (id) {
        id -> Integer,
        timestamp -> Timestamp,
        status -> Text,
        failure_count -> Integer,
        next_run_schedule -> Nullable<Timestamp>,
        n_downloaded -> Integer,
        n_ignored -> Integer,
        feed_id -> Integer,
    }
}

diesel::joinable!(feed -> user (user_id));
diesel::joinable!(entry -> feed (feed_id));
diesel::joinable!(feed_update_run -> feed (feed_id));

diesel::allow_tables_to_appear_in_same_query!(user, feed, entry, feed_update_run);
