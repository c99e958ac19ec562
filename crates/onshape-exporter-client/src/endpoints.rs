//! Typed wrappers for the Onshape endpoints the exporter uses.

use crate::client::{ApiRequest, ApiResponse, ClientError, OnshapeClient};
use onshape_exporter_bom::{parse_bom, BomTable, ItemSource, RevisionType};

/// Rendered image size for shaded views.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShadedViewOptions {
    /// Output height in pixels
    pub output_height: u32,
    /// Output width in pixels
    pub output_width: u32,
}

impl Default for ShadedViewOptions {
    fn default() -> Self {
        Self {
            output_height: 1200,
            output_width: 850,
        }
    }
}

/// Assembly bill-of-materials request.
#[must_use]
pub fn assembly_bom_request(did: &str, wid: &str, eid: &str) -> ApiRequest {
    ApiRequest::get(format!("/api/assemblies/d/{did}/w/{wid}/e/{eid}/bom"))
        .query("generateIfAbsent", "true")
        .query("multiLevel", "true")
        .query("indented", "false")
}

/// Binary STL export request for a single part.
#[must_use]
pub fn export_part_request(
    did: &str,
    wvm_type: RevisionType,
    wvm_id: &str,
    eid: &str,
    part_id: &str,
    configuration: &str,
) -> ApiRequest {
    ApiRequest::get(format!(
        "/api/partstudios/d/{did}/{wvm_type}/{wvm_id}/e/{eid}/stl"
    ))
    .query("mode", "binary")
    .query("partIds", part_id)
    .query("grouping", "false")
    .query("units", "millimeter")
    .query("configuration", configuration)
}

/// Trimetric shaded view request for an assembly.
#[must_use]
pub fn shaded_view_request(
    did: &str,
    wid: &str,
    eid: &str,
    options: ShadedViewOptions,
) -> ApiRequest {
    ApiRequest::get(format!(
        "/api/assemblies/d/{did}/w/{wid}/e/{eid}/shadedviews"
    ))
    .query("viewMatrix", "trimetric")
    .query("outputHeight", options.output_height)
    .query("outputWidth", options.output_width)
    .query("showAllParts", "true")
    .query("useAntiAliasing", "true")
    .query("pixelSize", 0)
}

impl OnshapeClient {
    /// Fetch the raw bill of materials of an assembly.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure.
    pub async fn get_assembly_bom(
        &self,
        did: &str,
        wid: &str,
        eid: &str,
    ) -> Result<ApiResponse, ClientError> {
        tracing::debug!(did, wid, eid, "Fetching assembly BOM");
        self.call(assembly_bom_request(did, wid, eid)).await
    }

    /// Fetch and normalize the bill of materials of an assembly.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure, a non-JSON response, or a
    /// malformed BOM payload.
    pub async fn fetch_bom(&self, did: &str, wid: &str, eid: &str) -> Result<BomTable, ClientError> {
        match self.get_assembly_bom(did, wid, eid).await? {
            ApiResponse::Json(value) => Ok(parse_bom(&value)?),
            ApiResponse::Raw(body) => Err(ClientError::UnexpectedResponse(format!(
                "BOM endpoint returned {} non-JSON bytes: {}",
                body.len(),
                String::from_utf8_lossy(&body[..body.len().min(200)])
            ))),
        }
    }

    /// Export a part as binary STL in millimeters.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure.
    pub async fn export_part(
        &self,
        did: &str,
        wvm_type: RevisionType,
        wvm_id: &str,
        eid: &str,
        part_id: &str,
        configuration: &str,
    ) -> Result<ApiResponse, ClientError> {
        tracing::debug!(did, %wvm_type, wvm_id, eid, part_id, "Exporting part");
        self.call(export_part_request(
            did,
            wvm_type,
            wvm_id,
            eid,
            part_id,
            configuration,
        ))
        .await
    }

    /// Export the part a BOM line item points at.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure.
    pub async fn export_item(&self, source: &ItemSource) -> Result<ApiResponse, ClientError> {
        self.export_part(
            &source.document_id,
            source.revision_type,
            &source.revision_id,
            &source.element_id,
            &source.part_id,
            &source.configuration,
        )
        .await
    }

    /// Render a shaded trimetric view of an assembly.
    ///
    /// # Errors
    ///
    /// Returns error on transport failure.
    pub async fn get_shaded_view(
        &self,
        did: &str,
        wid: &str,
        eid: &str,
        options: ShadedViewOptions,
    ) -> Result<ApiResponse, ClientError> {
        tracing::debug!(did, wid, eid, ?options, "Fetching shaded view");
        self.call(shaded_view_request(did, wid, eid, options)).await
    }
}
