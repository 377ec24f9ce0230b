//! Resource catalogue
//!
//! Every resource the service manages, top-level and embedded, declared in
//! one place.

use tracing::debug;

use crate::model::{FieldSpec, ModelSchema};
use crate::storage::{DocumentStore, StoreResult};

pub static ORGANISATIONS: ModelSchema = ModelSchema {
    name: "organisations",
    collection: "organisations",
    embedded_field: None,
    fields: &[
        FieldSpec::key("name"),
        FieldSpec::key("org_owner_email"),
        FieldSpec::id("deleted_by").references("users"),
    ],
    soft_delete: true,
    timestamps: true,
};

pub static USERS: ModelSchema = ModelSchema {
    name: "users",
    collection: "users",
    embedded_field: None,
    fields: &[
        FieldSpec::key("first_name"),
        FieldSpec::key("last_name"),
        FieldSpec::key("email"),
        FieldSpec::id("organisation_id").references("organisations"),
        FieldSpec::id("role_id").references("roles"),
        FieldSpec::id("default_project").references("projects"),
        FieldSpec::id("favourite_project").references("projects"),
        FieldSpec::id("deleted_by").references("users"),
    ],
    soft_delete: true,
    timestamps: true,
};

pub static ROLES: ModelSchema = ModelSchema {
    name: "roles",
    collection: "roles",
    embedded_field: None,
    fields: &[
        FieldSpec::key("name"),
        FieldSpec::id("organisation_id")
            .references("organisations")
            .as_key(),
    ],
    soft_delete: false,
    timestamps: false,
};

pub static ROLE_PERMISSIONS: ModelSchema = ModelSchema {
    name: "roles.permissions",
    collection: "roles",
    embedded_field: Some("permissions"),
    fields: &[FieldSpec::id("platform_resource_id")
        .references("platform_resources")
        .as_key()],
    soft_delete: false,
    timestamps: false,
};

pub static PLATFORM_RESOURCES: ModelSchema = ModelSchema {
    name: "platform_resources",
    collection: "platform_resources",
    embedded_field: None,
    fields: &[FieldSpec::key("name")],
    soft_delete: false,
    timestamps: false,
};

pub static PROJECTS: ModelSchema = ModelSchema {
    name: "projects",
    collection: "projects",
    embedded_field: None,
    fields: &[
        FieldSpec::key("name"),
        FieldSpec::id("organisation_id")
            .references("organisations")
            .as_key(),
        FieldSpec::id("created_by").references("users"),
        FieldSpec::id("updated_by").references("users"),
        FieldSpec::id("deleted_by").references("users"),
        FieldSpec::id("users"),
    ],
    soft_delete: true,
    timestamps: true,
};

pub static FACILITY: ModelSchema = ModelSchema {
    name: "facility",
    collection: "facility",
    embedded_field: None,
    fields: &[
        FieldSpec::key("name"),
        FieldSpec::id("organisation_id")
            .references("organisations")
            .as_key(),
        FieldSpec::id("created_by").references("users"),
        FieldSpec::id("deleted_by").references("users"),
    ],
    soft_delete: true,
    timestamps: true,
};

pub static STATIONS: ModelSchema = ModelSchema {
    name: "stations",
    collection: "stations",
    embedded_field: None,
    fields: &[
        FieldSpec::key("name"),
        FieldSpec::id("organisation_id")
            .references("organisations")
            .as_key(),
        FieldSpec::id("facility_id").references("facility"),
        FieldSpec::id("created_by").references("users"),
        FieldSpec::id("deleted_by").references("users"),
    ],
    soft_delete: true,
    timestamps: true,
};

pub static STATION_INSTRUMENTS: ModelSchema = ModelSchema {
    name: "stations.instruments",
    collection: "stations",
    embedded_field: Some("instruments"),
    fields: &[
        FieldSpec::key("instrument_alias"),
        FieldSpec::id("instrument_id").references("instruments"),
    ],
    soft_delete: false,
    timestamps: false,
};

pub static INSTRUMENTS_CATEGORY: ModelSchema = ModelSchema {
    name: "instruments_category",
    collection: "instruments_category",
    embedded_field: None,
    fields: &[
        FieldSpec::key("name"),
        FieldSpec::id("organisation_id")
            .references("organisations")
            .as_key(),
        FieldSpec::id("created_by").references("users"),
        FieldSpec::id("deleted_by").references("users"),
    ],
    soft_delete: true,
    timestamps: true,
};

pub static INSTRUMENTS: ModelSchema = ModelSchema {
    name: "instruments",
    collection: "instruments",
    embedded_field: None,
    fields: &[
        FieldSpec::key("model"),
        FieldSpec::key("manufacturer"),
        FieldSpec::id("organisation_id").references("organisations"),
        FieldSpec::id("instrument_category").references("instruments_category"),
        FieldSpec::id("created_by").references("users"),
        FieldSpec::id("deleted_by").references("users"),
    ],
    soft_delete: true,
    timestamps: true,
};

pub static INSTRUMENT_DRIVERS: ModelSchema = ModelSchema {
    name: "instruments.drivers",
    collection: "instruments",
    embedded_field: Some("drivers"),
    fields: &[FieldSpec::key("driver_class")],
    soft_delete: false,
    timestamps: false,
};

pub static STEP_TYPES: ModelSchema = ModelSchema {
    name: "step_types",
    collection: "step_types",
    embedded_field: None,
    fields: &[FieldSpec::key("name")],
    soft_delete: false,
    timestamps: false,
};

pub static INSTRUCTIONS: ModelSchema = ModelSchema {
    name: "instructions",
    collection: "instructions",
    embedded_field: None,
    fields: &[
        FieldSpec::key("name"),
        FieldSpec::id("instrument_id")
            .references("instruments")
            .as_key(),
        FieldSpec::id("project_id").references("projects"),
        FieldSpec::id("created_by").references("users"),
        FieldSpec::id("deleted_by").references("users"),
    ],
    soft_delete: true,
    timestamps: true,
};

pub static INSTRUCTION_ARGUMENTS: ModelSchema = ModelSchema {
    name: "instructions.arguments",
    collection: "instructions",
    embedded_field: Some("arguments"),
    fields: &[FieldSpec::key("name")],
    soft_delete: false,
    timestamps: false,
};

pub static INSTRUCTION_RESPONSES: ModelSchema = ModelSchema {
    name: "instructions.responses",
    collection: "instructions",
    embedded_field: Some("responses"),
    fields: &[
        FieldSpec::key("name"),
        FieldSpec::id("data_transform_id")
            .references("data_transforms")
            .as_key(),
    ],
    soft_delete: false,
    timestamps: false,
};

pub static DATA_TRANSFORMS: ModelSchema = ModelSchema {
    name: "data_transforms",
    collection: "data_transforms",
    embedded_field: None,
    fields: &[
        FieldSpec::key("name"),
        FieldSpec::id("project_id").references("projects"),
        FieldSpec::id("created_by").references("users"),
        FieldSpec::id("deleted_by").references("users"),
    ],
    soft_delete: true,
    timestamps: true,
};

pub static SEQUENCES: ModelSchema = ModelSchema {
    name: "sequences",
    collection: "sequences",
    embedded_field: None,
    fields: &[
        FieldSpec::key("name"),
        FieldSpec::id("project_id").references("projects"),
        FieldSpec::id("organisation_id").references("organisations"),
        FieldSpec::id("created_by").references("users"),
    ],
    soft_delete: false,
    timestamps: true,
};

pub static SEQUENCE_STEPS: ModelSchema = ModelSchema {
    name: "sequences.steps",
    collection: "sequences",
    embedded_field: Some("steps"),
    fields: &[
        FieldSpec::key("name"),
        FieldSpec::id("step_type_id").references("step_types"),
    ],
    soft_delete: false,
    timestamps: false,
};

pub static SEQUENCE_CHANNELS: ModelSchema = ModelSchema {
    name: "sequences.channels",
    collection: "sequences",
    embedded_field: Some("channels"),
    fields: &[
        FieldSpec::key("name"),
        FieldSpec::id("instrument_id").references("instruments"),
    ],
    soft_delete: false,
    timestamps: false,
};

pub static SEQUENCE_CHANNEL_GROUPS: ModelSchema = ModelSchema {
    name: "sequences.channel_groups",
    collection: "sequences",
    embedded_field: Some("channel_groups"),
    fields: &[FieldSpec::key("name")],
    soft_delete: false,
    timestamps: false,
};

pub static SEQUENCE_RESOURCES: ModelSchema = ModelSchema {
    name: "sequences.resources",
    collection: "sequences",
    embedded_field: Some("resources"),
    fields: &[
        FieldSpec::key("name"),
        FieldSpec::id("instrument_id").references("instruments"),
    ],
    soft_delete: false,
    timestamps: false,
};

pub static SEQUENCE_USER_VARIABLES: ModelSchema = ModelSchema {
    name: "sequences.user_variables",
    collection: "sequences",
    embedded_field: Some("user_variables"),
    fields: &[
        FieldSpec::key("name"),
        FieldSpec::id("data_transform_id").references("data_transforms"),
    ],
    soft_delete: false,
    timestamps: false,
};

/// Every catalogued resource
pub static MODELS: &[&ModelSchema] = &[
    &ORGANISATIONS,
    &USERS,
    &ROLES,
    &ROLE_PERMISSIONS,
    &PLATFORM_RESOURCES,
    &PROJECTS,
    &FACILITY,
    &STATIONS,
    &STATION_INSTRUMENTS,
    &INSTRUMENTS_CATEGORY,
    &INSTRUMENTS,
    &INSTRUMENT_DRIVERS,
    &STEP_TYPES,
    &INSTRUCTIONS,
    &INSTRUCTION_ARGUMENTS,
    &INSTRUCTION_RESPONSES,
    &DATA_TRANSFORMS,
    &SEQUENCES,
    &SEQUENCE_STEPS,
    &SEQUENCE_CHANNELS,
    &SEQUENCE_CHANNEL_GROUPS,
    &SEQUENCE_RESOURCES,
    &SEQUENCE_USER_VARIABLES,
];

/// Resolve a resource by name
pub fn lookup(name: &str) -> Option<&'static ModelSchema> {
    MODELS.iter().copied().find(|schema| schema.name == name)
}

/// Schemas with a foreign key into `collection`, paired with the field name
pub fn referencing(collection: &str) -> Vec<(&'static ModelSchema, &'static str)> {
    MODELS
        .iter()
        .copied()
        .flat_map(|schema| {
            schema
                .foreign_keys()
                .filter(|(_, reference)| reference.collection == collection)
                .map(move |(field, _)| (schema, field))
        })
        .collect()
}

/// Push key-field uniqueness of every top-level resource down into the store.
///
/// Returns how many indexes the backend accepted.
pub fn ensure_unique_indexes(store: &dyn DocumentStore) -> StoreResult<usize> {
    let mut created = 0;
    for schema in MODELS.iter().filter(|s| !s.is_embedded()) {
        let key_fields = schema.key_fields();
        if key_fields.is_empty() {
            continue;
        }
        if store.ensure_unique_index(schema.collection, &key_fields)? {
            debug!(resource = schema.name, ?key_fields, "Unique index ensured");
            created += 1;
        }
    }
    Ok(created)
}
