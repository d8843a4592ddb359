//! Pattern-keyed model context providers.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::ModelContext;
use crate::error::CoreError;

/// Produces a [`ModelContext`] for a pattern (e.g. a persona or model id).
#[async_trait]
pub trait ModelContextProvider: Send + Sync {
    async fn model_context(&self, pattern: &str) -> Result<Box<dyn ModelContext>, CoreError>;
}

/// Function-backed provider.
pub struct ModelContextProviderFn<F>(pub F);

#[async_trait]
impl<F> ModelContextProvider for ModelContextProviderFn<F>
where
    F: Fn(&str) -> Result<Box<dyn ModelContext>, CoreError> + Send + Sync,
{
    async fn model_context(&self, pattern: &str) -> Result<Box<dyn ModelContext>, CoreError> {
        (self.0)(pattern)
    }
}

/// Routes context requests to providers by exact pattern.
#[derive(Default)]
pub struct ModelContextMux {
    routes: HashMap<String, Arc<dyn ModelContextProvider>>,
}

impl ModelContextMux {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(
        &mut self,
        pattern: impl Into<String>,
        provider: Arc<dyn ModelContextProvider>,
    ) -> Result<(), CoreError> {
        let pattern = pattern.into();
        if self.routes.contains_key(&pattern) {
            return Err(CoreError::msg(format!(
                "model context provider already registered for {pattern}"
            )));
        }
        self.routes.insert(pattern, provider);
        Ok(())
    }

    pub async fn model_context(&self, pattern: &str) -> Result<Box<dyn ModelContext>, CoreError> {
        let provider = self.routes.get(pattern).ok_or_else(|| {
            CoreError::msg(format!("model context provider not found for {pattern}"))
        })?;
        provider.model_context(pattern).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::ModelContextBuilder;

    fn provider(text: &'static str) -> Arc<dyn ModelContextProvider> {
        Arc::new(ModelContextProviderFn(move |_pattern: &str| {
            let mut b = ModelContextBuilder::new();
            b.prompt_text("system", text);
            Ok(Box::new(b.build()) as Box<dyn ModelContext>)
        }))
    }

    #[tokio::test]
    async fn routes_by_pattern() {
        let mut mux = ModelContextMux::new();
        mux.handle("bot/cheerful", provider("be cheerful")).unwrap();
        mux.handle("bot/calm", provider("be calm")).unwrap();

        let ctx = mux.model_context("bot/calm").await.unwrap();
        assert_eq!(ctx.prompts().next().unwrap().text, "be calm");
    }

    #[tokio::test]
    async fn duplicate_and_missing_patterns_error() {
        let mut mux = ModelContextMux::new();
        mux.handle("bot/one", provider("x")).unwrap();
        assert!(mux.handle("bot/one", provider("y")).is_err());
        assert!(mux.model_context("bot/none").await.is_err());
    }
}
