pub type FrostResult<T> = Result<T, FrostError>;

#[derive(thiserror::Error, Debug)]
pub enum FrostError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("render error: {0}")]
    Render(String),

    #[error("analysis error: {0}")]
    Analysis(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FrostError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    pub fn analysis(msg: impl Into<String>) -> Self {
        Self::Analysis(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefixes_are_stable() {
        assert!(
            FrostError::validation("x")
                .to_string()
                .contains("validation error:")
        );
        assert!(FrostError::render("x").to_string().contains("render error:"));
        assert!(
            FrostError::analysis("x")
                .to_string()
                .contains("analysis error:")
        );
    }

    #[test]
    fn other_preserves_source() {
        let base = std::io::Error::other("boom");
        let err = FrostError::Other(anyhow::Error::new(base));
        assert!(err.to_string().contains("boom"));
    }
}
