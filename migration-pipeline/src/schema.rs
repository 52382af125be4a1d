use std::sync::Arc;

use tracing::{info, warn};

use common::{
    error::AppError,
    storage::destination::{DestinationStore, FieldDef, FieldTypeDef, DENSE_VECTOR_CLASS},
    types::vector_spec::{CollectionParams, Similarity, VectorFieldSpec},
    utils::config::MigrationJob,
};

/// Name of the vector field carried by derived chunk documents.
pub const CHUNK_VECTOR_FIELD: &str = "vector";

/// Derives the destination field-type name for one enriched field.
pub fn field_type_name(field: &str, dimension: usize) -> String {
    format!("knn_{field}_{dimension}")
}

enum FieldCheck {
    Present,
    Absent,
    Mismatch,
}

/// Validates and provisions the destination schema before a run.
///
/// Field types must be dense-vector typed with the exact dimensionality the
/// embedding service produces; similarity and HNSW parameters are verified
/// only when a spec configures them. Running against an already-correct
/// schema performs no mutating calls.
pub struct SchemaValidator {
    store: Arc<dyn DestinationStore>,
    dimension: usize,
}

impl SchemaValidator {
    pub fn new(store: Arc<dyn DestinationStore>, dimension: usize) -> Self {
        Self { store, dimension }
    }

    /// Ensures collections, field types, and vector fields for the whole
    /// job. Returns the specs with every inline target field resolved to
    /// the name that was actually validated or created.
    pub async fn ensure_all(&self, job: &MigrationJob) -> Result<Vec<VectorFieldSpec>, AppError> {
        self.ensure_collection(&job.destination_collection, &job.collection_params)
            .await?;

        let mut resolved = Vec::with_capacity(job.vector_fields.len());
        for spec in &job.vector_fields {
            let mut spec = spec.clone();
            if spec.chunked {
                self.ensure_collection(&spec.collection, &spec.collection_params)
                    .await?;
                let type_name = self.ensure_field_type(&spec.collection, &spec).await?;
                // Chunk documents carry their vector under a fixed field
                // name, so a mismatch there cannot be renamed around.
                self.ensure_vector_field(&spec.collection, &type_name, CHUNK_VECTOR_FIELD, None)
                    .await?;
            } else {
                let type_name = self
                    .ensure_field_type(&job.destination_collection, &spec)
                    .await?;
                let target = spec.target_vector_field();
                let actual = self
                    .ensure_vector_field(
                        &job.destination_collection,
                        &type_name,
                        &target,
                        Some(spec.similarity_or_default()),
                    )
                    .await?;
                spec.vector_field = Some(actual);
            }
            resolved.push(spec);
        }
        Ok(resolved)
    }

    async fn ensure_collection(
        &self,
        name: &str,
        params: &CollectionParams,
    ) -> Result<(), AppError> {
        if self.store.collection_exists(name).await? {
            return Ok(());
        }
        info!(collection = name, "creating destination collection");
        self.store.create_collection(name, params).await
    }

    /// Validates the field type for `spec`, creating it when absent, and
    /// returns its name. A freshly created type is re-fetched so the run
    /// never proceeds on an unverified schema.
    async fn ensure_field_type(
        &self,
        collection: &str,
        spec: &VectorFieldSpec,
    ) -> Result<String, AppError> {
        let name = field_type_name(&spec.field, self.dimension);

        match self.store.get_field_type(collection, &name).await? {
            Some(existing) => self.validate_field_type(&existing, spec)?,
            None => {
                info!(collection, field_type = %name, "creating dense vector field type");
                self.store
                    .add_field_type(collection, &self.desired_field_type(&name, spec))
                    .await?;
                let created = self
                    .store
                    .get_field_type(collection, &name)
                    .await?
                    .ok_or_else(|| {
                        AppError::SchemaMismatch(format!(
                            "field type '{name}' still missing after creation in '{collection}'"
                        ))
                    })?;
                self.validate_field_type(&created, spec)?;
            }
        }
        Ok(name)
    }

    fn desired_field_type(&self, name: &str, spec: &VectorFieldSpec) -> FieldTypeDef {
        FieldTypeDef {
            name: name.to_string(),
            class: DENSE_VECTOR_CLASS.to_string(),
            vector_dimension: Some(self.dimension),
            similarity_function: Some(spec.similarity_or_default().as_str().to_string()),
            hnsw_max_connections: spec.hnsw_max_connections,
            hnsw_beam_width: spec.hnsw_beam_width,
        }
    }

    fn validate_field_type(
        &self,
        def: &FieldTypeDef,
        spec: &VectorFieldSpec,
    ) -> Result<(), AppError> {
        if def.class != DENSE_VECTOR_CLASS {
            return Err(AppError::SchemaMismatch(format!(
                "field type '{}' has class '{}', expected '{DENSE_VECTOR_CLASS}'",
                def.name, def.class
            )));
        }
        if def.vector_dimension != Some(self.dimension) {
            return Err(AppError::SchemaMismatch(format!(
                "field type '{}' has dimension {:?}, embedding service produces {}",
                def.name, def.vector_dimension, self.dimension
            )));
        }
        if spec.similarity.is_some() {
            let expected = spec.similarity_or_default().as_str();
            if def.similarity_function.as_deref() != Some(expected) {
                return Err(AppError::SchemaMismatch(format!(
                    "field type '{}' has similarity {:?}, configured '{expected}'",
                    def.name, def.similarity_function
                )));
            }
        }
        if spec.hnsw_max_connections.is_some()
            && def.hnsw_max_connections != spec.hnsw_max_connections
        {
            return Err(AppError::SchemaMismatch(format!(
                "field type '{}' hnswMaxConnections {:?} != configured {:?}",
                def.name, def.hnsw_max_connections, spec.hnsw_max_connections
            )));
        }
        if spec.hnsw_beam_width.is_some() && def.hnsw_beam_width != spec.hnsw_beam_width {
            return Err(AppError::SchemaMismatch(format!(
                "field type '{}' hnswBeamWidth {:?} != configured {:?}",
                def.name, def.hnsw_beam_width, spec.hnsw_beam_width
            )));
        }
        Ok(())
    }

    /// Ensures a vector field bound to `type_name` exists under `name`.
    ///
    /// When the field exists but is bound to a different type and an
    /// alternate similarity is given, one rename attempt is made under
    /// `<name>_<similarity>` before giving up. Returns the field name that
    /// ended up valid.
    async fn ensure_vector_field(
        &self,
        collection: &str,
        type_name: &str,
        name: &str,
        alternate: Option<Similarity>,
    ) -> Result<String, AppError> {
        match self.check_field(collection, type_name, name).await? {
            FieldCheck::Present => Ok(name.to_string()),
            FieldCheck::Absent => {
                self.create_field(collection, type_name, name).await?;
                Ok(name.to_string())
            }
            FieldCheck::Mismatch => {
                let Some(similarity) = alternate else {
                    return Err(AppError::SchemaMismatch(format!(
                        "field '{name}' in '{collection}' is not bound to '{type_name}'"
                    )));
                };

                let renamed = format!("{name}_{}", similarity.as_str());
                warn!(
                    collection,
                    field = name,
                    alternate = %renamed,
                    "vector field bound to a different type; trying alternate name"
                );
                match self.check_field(collection, type_name, &renamed).await? {
                    FieldCheck::Present => Ok(renamed),
                    FieldCheck::Absent => {
                        self.create_field(collection, type_name, &renamed).await?;
                        Ok(renamed)
                    }
                    FieldCheck::Mismatch => Err(AppError::SchemaMismatch(format!(
                        "fields '{name}' and '{renamed}' in '{collection}' are both bound to other types"
                    ))),
                }
            }
        }
    }

    async fn check_field(
        &self,
        collection: &str,
        type_name: &str,
        name: &str,
    ) -> Result<FieldCheck, AppError> {
        match self.store.get_field(collection, name).await? {
            None => Ok(FieldCheck::Absent),
            Some(def) if def.field_type == type_name => Ok(FieldCheck::Present),
            Some(_) => Ok(FieldCheck::Mismatch),
        }
    }

    async fn create_field(
        &self,
        collection: &str,
        type_name: &str,
        name: &str,
    ) -> Result<(), AppError> {
        info!(collection, field = name, field_type = type_name, "creating vector field");
        self.store
            .add_field(
                collection,
                &FieldDef {
                    name: name.to_string(),
                    field_type: type_name.to_string(),
                    indexed: true,
                    stored: true,
                },
            )
            .await
    }
}
