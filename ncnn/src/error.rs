use thiserror::Error;

/// Errors from the ncnn C API.
#[derive(Debug, Error)]
pub enum NcnnError {
    #[error("ncnn: allocation failed for {0}")]
    Alloc(&'static str),

    #[error("ncnn: load param failed (code {0})")]
    LoadParam(i32),

    #[error("ncnn: load model failed (code {0})")]
    LoadModel(i32),

    #[error("ncnn: set input '{name}' failed (code {code})")]
    SetInput { name: String, code: i32 },

    #[error("ncnn: extract '{name}' failed (code {code})")]
    Extract { name: String, code: i32 },

    #[error("ncnn: invalid argument: {0}")]
    InvalidArgument(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_carries_context() {
        let err = NcnnError::SetInput {
            name: "in0".into(),
            code: -1,
        };
        assert!(err.to_string().contains("in0"));
        assert!(err.to_string().contains("-1"));
        assert!(NcnnError::Alloc("mat").to_string().contains("mat"));
    }
}
