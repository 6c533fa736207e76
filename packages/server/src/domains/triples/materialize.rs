//! Persist parsed triples as blobs and record their locations.
//!
//! Runs inside the task-completion transaction: database writes go through the
//! caller's connection so they commit or roll back with the task update.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::PgConnection;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::domains::projects::{Material, Project};
use crate::domains::triples::triple::{parse_triples, partition_by_type, Triple};
use crate::kernel::BaseBlobStore;

/// Downloaded extraction output for one material.
#[derive(Debug, Clone)]
pub struct MaterialOutput {
    pub material: Material,
    pub text: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterializeSummary {
    pub materials_saved: usize,
    pub materials_skipped: usize,
    pub triples: usize,
    pub project_triple_url: String,
    pub group_urls: BTreeMap<String, String>,
}

fn blob_suffix() -> String {
    let id = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Utc::now().format("%Y%m%d%H%M%S"), &id[..8])
}

fn to_json(triples: &[Triple]) -> Result<String> {
    serde_json::to_string(triples).context("Failed to serialize triples")
}

/// Parse every material's output, then store per-material, project-wide and
/// per-type blobs.
///
/// A material whose output is malformed, or whose blob cannot be saved, is
/// skipped. Failing to save the project aggregate or any type group is an
/// error, so the recorded groups always cover the whole project list.
pub async fn materialize_results(
    project: &Project,
    outputs: &[MaterialOutput],
    blob_store: &dyn BaseBlobStore,
    conn: &mut PgConnection,
) -> Result<MaterializeSummary> {
    let mut summary = MaterializeSummary::default();
    let mut project_triples: Vec<Triple> = Vec::new();

    for output in outputs {
        let material = &output.material;
        let triples = match parse_triples(&output.text, material) {
            Ok(triples) => triples,
            Err(e) => {
                warn!(
                    material_id = %material.id,
                    error = %e,
                    "Skipping material with malformed extraction output"
                );
                summary.materials_skipped += 1;
                continue;
            }
        };

        project_triples.extend(triples.iter().cloned());

        let file_name = format!("triples_material_{}_{}", material.id, material.file_stem());
        match blob_store
            .save_json(project.user_id, &file_name, &to_json(&triples)?)
            .await
        {
            Ok(location) => {
                Material::set_triple_url(material.id, &location, &mut *conn).await?;
                summary.materials_saved += 1;
                debug!(material_id = %material.id, triples = triples.len(), "Material triples saved");
            }
            Err(e) => {
                warn!(material_id = %material.id, error = %e, "Failed to save material triples");
                summary.materials_skipped += 1;
            }
        }
    }

    let project_file = format!("triples_project_{}_{}", project.id, blob_suffix());
    summary.project_triple_url = blob_store
        .save_json(project.user_id, &project_file, &to_json(&project_triples)?)
        .await
        .with_context(|| format!("Failed to save triples for project {}", project.id))?;

    for (type_key, triples) in partition_by_type(&project_triples) {
        let group_file = format!("triples_project_type{}_{}", type_key, blob_suffix());
        let location = blob_store
            .save_json(project.user_id, &group_file, &to_json(&triples)?)
            .await
            .with_context(|| {
                format!("Failed to save {} triples for project {}", type_key, project.id)
            })?;
        summary.group_urls.insert(type_key, location);
    }

    Project::set_triple_urls(
        project.id,
        &summary.project_triple_url,
        &summary.group_urls,
        &mut *conn,
    )
    .await?;

    summary.triples = project_triples.len();
    info!(
        project_id = %project.id,
        triples = summary.triples,
        groups = summary.group_urls.len(),
        materials_saved = summary.materials_saved,
        materials_skipped = summary.materials_skipped,
        "Triples materialized"
    );

    Ok(summary)
}
