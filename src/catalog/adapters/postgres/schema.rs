//! Diesel schema for catalog persistence.

diesel::table! {
    /// Catalog sources.
    registries (id) {
        /// Registry identifier.
        id -> Uuid,
        /// Unique registry name.
        name -> Text,
        /// Source kind (`FILE`, `REMOTE`, `MANAGED`).
        #[max_length = 16]
        reg_type -> Varchar,
        /// Provenance (`CONFIG`, `API`).
        #[max_length = 16]
        creation_type -> Varchar,
        /// Whether background sync may refresh the registry.
        syncable -> Bool,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// One version of one named server or skill within a registry.
    registry_entries (id) {
        /// Entry identifier.
        id -> Uuid,
        /// Owning registry.
        reg_id -> Uuid,
        /// Entry kind (`MCP`, `SKILL`).
        #[max_length = 16]
        entry_type -> Varchar,
        /// Entry name.
        name -> Text,
        /// Version string.
        version -> Text,
        /// Optional display title.
        title -> Nullable<Text>,
        /// Optional description.
        description -> Nullable<Text>,
        /// Provenance (`CONFIG`, `API`).
        #[max_length = 16]
        creation_type -> Varchar,
        /// Creation timestamp.
        created_at -> Timestamptz,
        /// Last update timestamp.
        updated_at -> Timestamptz,
    }
}

diesel::table! {
    /// Server fields stored 1:1 with `MCP` entries.
    server_versions (entry_id) {
        /// Owning entry.
        entry_id -> Uuid,
        /// Project website.
        website_url -> Nullable<Text>,
        /// Source repository document.
        repository -> Nullable<Jsonb>,
        /// Upstream metadata blob.
        upstream_meta -> Nullable<Text>,
        /// Publisher metadata blob.
        server_meta -> Nullable<Text>,
    }
}

diesel::table! {
    /// Installable packages of a server version.
    server_packages (seq) {
        /// Insertion order.
        seq -> Int8,
        /// Owning server version.
        entry_id -> Uuid,
        /// Package ecosystem.
        registry_type -> Text,
        /// Package registry base URL.
        registry_base_url -> Nullable<Text>,
        /// Package identifier.
        identifier -> Text,
        /// Package version.
        version -> Nullable<Text>,
        /// Runtime launcher.
        runtime_hint -> Nullable<Text>,
        /// Runtime arguments.
        runtime_arguments -> Array<Text>,
        /// Transport document.
        transport -> Jsonb,
        /// Environment variable documents.
        environment_variables -> Jsonb,
    }
}

diesel::table! {
    /// Hosted endpoints of a server version.
    server_remotes (seq) {
        /// Insertion order.
        seq -> Int8,
        /// Owning server version.
        entry_id -> Uuid,
        /// Transport kind.
        transport_type -> Text,
        /// Endpoint URL.
        url -> Text,
        /// Header documents.
        headers -> Jsonb,
    }
}

diesel::table! {
    /// Icons of a server version, one per theme.
    server_icons (entry_id, theme) {
        /// Owning server version.
        entry_id -> Uuid,
        /// Target theme.
        #[max_length = 16]
        theme -> Varchar,
        /// Icon source.
        src -> Text,
        /// MIME type.
        mime_type -> Nullable<Text>,
        /// Declared sizes.
        sizes -> Array<Text>,
    }
}

diesel::table! {
    /// Skill fields stored 1:1 with `SKILL` entries.
    skill_versions (entry_id) {
        /// Owning entry.
        entry_id -> Uuid,
        /// Publisher namespace.
        namespace -> Text,
        /// Publication status.
        #[max_length = 16]
        status -> Varchar,
        /// License expression.
        license -> Nullable<Text>,
        /// Compatibility statement.
        compatibility -> Nullable<Text>,
        /// Allowed tools.
        allowed_tools -> Array<Text>,
        /// Repository blob.
        repository -> Nullable<Text>,
        /// Icons blob.
        icons -> Nullable<Text>,
        /// Metadata blob.
        metadata -> Nullable<Text>,
    }
}

diesel::table! {
    /// Git distributions of a skill version.
    skill_git_packages (seq) {
        /// Insertion order.
        seq -> Int8,
        /// Owning skill version.
        entry_id -> Uuid,
        /// Clone URL.
        url -> Text,
        /// Branch or tag.
        git_ref -> Nullable<Text>,
        /// Pinned commit.
        commit_sha -> Nullable<Text>,
        /// Path within the repository.
        subfolder -> Nullable<Text>,
    }
}

diesel::table! {
    /// OCI distributions of a skill version.
    skill_oci_packages (seq) {
        /// Insertion order.
        seq -> Int8,
        /// Owning skill version.
        entry_id -> Uuid,
        /// Image reference.
        identifier -> Text,
        /// Content digest.
        digest -> Nullable<Text>,
        /// Artifact media type.
        media_type -> Nullable<Text>,
    }
}

diesel::table! {
    /// Latest server version per `(registry, name)`.
    latest_server_versions (reg_id, name) {
        /// Owning registry.
        reg_id -> Uuid,
        /// Entry name.
        name -> Text,
        /// Version the pointer selects.
        version -> Text,
        /// Referenced server version.
        entry_id -> Uuid,
    }
}

diesel::table! {
    /// Latest skill version per `(registry, name)`.
    latest_skill_versions (reg_id, name) {
        /// Owning registry.
        reg_id -> Uuid,
        /// Entry name.
        name -> Text,
        /// Version the pointer selects.
        version -> Text,
        /// Referenced skill version.
        entry_id -> Uuid,
    }
}

diesel::table! {
    /// Audit trail of sync runs.
    registry_syncs (id) {
        /// Run identifier.
        id -> Uuid,
        /// Synced registry.
        reg_id -> Uuid,
        /// Run status.
        #[max_length = 16]
        status -> Varchar,
        /// Sanitized failure summary.
        error_msg -> Nullable<Text>,
        /// Start timestamp.
        started_at -> Timestamptz,
        /// End timestamp for terminal runs.
        ended_at -> Nullable<Timestamptz>,
    }
}

diesel::joinable!(registry_entries -> registries (reg_id));
diesel::joinable!(server_versions -> registry_entries (entry_id));
diesel::joinable!(skill_versions -> registry_entries (entry_id));
diesel::joinable!(server_packages -> server_versions (entry_id));
diesel::joinable!(server_remotes -> server_versions (entry_id));
diesel::joinable!(server_icons -> server_versions (entry_id));
diesel::joinable!(skill_git_packages -> skill_versions (entry_id));
diesel::joinable!(skill_oci_packages -> skill_versions (entry_id));
diesel::joinable!(registry_syncs -> registries (reg_id));

diesel::allow_tables_to_appear_in_same_query!(
    registries,
    registry_entries,
    server_versions,
    server_packages,
    server_remotes,
    server_icons,
    skill_versions,
    skill_git_packages,
    skill_oci_packages,
    latest_server_versions,
    latest_skill_versions,
    registry_syncs,
);
