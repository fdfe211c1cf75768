use crate::engine::{
    error::EngineError,
    models::ExecutionRequest,
    sandbox::{LanguageRegistry, RuntimeDescriptor},
};

const MISSING_FIELDS: &str = "Missing required fields: code, language, workspaceId, fileId";

/// A request that passed every check and carries its resolved runtime.
#[derive(Debug, Clone)]
pub struct ValidRequest {
    pub code: String,
    pub language: String,
    pub workspace_id: String,
    pub file_id: String,
    pub descriptor: RuntimeDescriptor,
}

/// Rejects malformed requests before any workspace or process exists.
pub fn validate(
    request: &ExecutionRequest,
    registry: &LanguageRegistry,
    max_code_bytes: usize,
) -> Result<ValidRequest, EngineError> {
    if request.code.is_empty()
        || request.language.is_empty()
        || request.workspace_id.is_empty()
        || request.file_id.is_empty()
    {
        return Err(EngineError::Validation(MISSING_FIELDS.to_string()));
    }

    let descriptor = registry.resolve(&request.language)?.clone();

    if request.code.len() > max_code_bytes {
        return Err(EngineError::Validation(format!(
            "code too large: {} bytes exceeds limit of {max_code_bytes}",
            request.code.len()
        )));
    }

    Ok(ValidRequest {
        code: request.code.clone(),
        language: request.language.clone(),
        workspace_id: request.workspace_id.clone(),
        file_id: request.file_id.clone(),
        descriptor,
    })
}
