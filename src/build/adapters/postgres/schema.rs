//! Diesel schema for build orchestration persistence.

diesel::table! {
    /// Build task records.
    build_tasks (id) {
        /// Store-assigned task identifier.
        id -> Int8,
        /// External task token.
        token -> Uuid,
        /// Initiating principal.
        initiator -> Int8,
        /// Lifecycle status.
        #[max_length = 20]
        status -> Varchar,
        /// Stage the task is in.
        #[max_length = 20]
        current_stage -> Nullable<Varchar>,
        /// Source A selector.
        source_a -> Jsonb,
        /// Source B selector.
        source_b -> Jsonb,
        /// Source A revision.
        #[max_length = 64]
        source_a_revision -> Nullable<Varchar>,
        /// Source B revision.
        #[max_length = 64]
        source_b_revision -> Nullable<Varchar>,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Start timestamp.
        started_at -> Nullable<Timestamptz>,
        /// Completion timestamp.
        completed_at -> Nullable<Timestamptz>,
        /// Fetch A duration in milliseconds.
        fetch_a_duration_ms -> Nullable<Int8>,
        /// Build A duration in milliseconds.
        build_a_duration_ms -> Nullable<Int8>,
        /// Fetch B duration in milliseconds.
        fetch_b_duration_ms -> Nullable<Int8>,
        /// Build B duration in milliseconds.
        build_b_duration_ms -> Nullable<Int8>,
        /// Total duration in milliseconds.
        total_duration_ms -> Nullable<Int8>,
        /// Progress percentage.
        progress -> Int2,
        /// Latest progress message.
        progress_message -> Nullable<Text>,
        /// Failure or cancellation cause.
        error_message -> Nullable<Text>,
    }
}

diesel::table! {
    /// Per-stage attempt records.
    build_stage_logs (id) {
        /// Store-assigned log identifier.
        id -> Int8,
        /// Owning task.
        task_id -> Int8,
        /// Stage name.
        #[max_length = 20]
        stage -> Varchar,
        /// Stage start timestamp.
        started_at -> Timestamptz,
        /// Stage end timestamp.
        completed_at -> Nullable<Timestamptz>,
        /// Stage outcome.
        success -> Nullable<Bool>,
        /// Captured output.
        log_content -> Nullable<Text>,
        /// Failure message.
        error_message -> Nullable<Text>,
    }
}

diesel::table! {
    /// Build output records.
    build_artifacts (id) {
        /// Store-assigned artifact identifier.
        id -> Int8,
        /// Producing task.
        task_id -> Int8,
        /// Stored file name.
        #[max_length = 255]
        file_name -> Varchar,
        /// Stored file path.
        file_path -> Text,
        /// File size in bytes.
        file_size -> Int8,
        /// Hex SHA-256 checksum.
        #[max_length = 64]
        checksum -> Varchar,
        /// Download URL path.
        download_url -> Text,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Download counter.
        download_count -> Int8,
        /// Last download timestamp.
        last_downloaded_at -> Nullable<Timestamptz>,
        /// Archival flag.
        is_archived -> Bool,
        /// Archival timestamp.
        archived_at -> Nullable<Timestamptz>,
    }
}

diesel::table! {
    /// Single-row lease table backing the global build lock.
    build_lock (name) {
        /// Lock name.
        #[max_length = 50]
        name -> Varchar,
        /// Task holding the lease.
        owner -> Int8,
        /// Lease expiry.
        expires_at -> Timestamptz,
    }
}

diesel::joinable!(build_stage_logs -> build_tasks (task_id));
diesel::joinable!(build_artifacts -> build_tasks (task_id));
diesel::allow_tables_to_appear_in_same_query!(build_tasks, build_stage_logs, build_artifacts);
