mod parsing;
mod settings;
mod types;

pub(crate) use types::{BatchSettings, InteractiveSettings, Settings};

#[cfg(test)]
mod tests {
    use super::types::{ConfigError, Environment};
    use super::*;
    use crate::db::types::ProcessingType;
    use crate::test_support;

    #[tokio::test]
    async fn load_uses_batch_defaults() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.batch().batch_size, 25);
        assert_eq!(settings.batch().stages, ProcessingType::ALL.to_vec());
        assert_eq!(settings.interactive().max_attempts, 3);
        assert_eq!(settings.provider().retention_hours, 48);
        assert_eq!(settings.runtime().environment, Environment::Test);
    }

    #[tokio::test]
    async fn zero_batch_size_is_rejected() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("SCRIPTORIUM_BATCH_SIZE", "0");

        let result = Settings::load();
        std::env::remove_var("SCRIPTORIUM_BATCH_SIZE");

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field: "SCRIPTORIUM_BATCH_SIZE", .. })
        ));
    }

    #[tokio::test]
    async fn strict_config_requires_operator_secret() {
        let _guard = test_support::env_lock().await;
        test_support::set_test_env();
        std::env::set_var("SCRIPTORIUM_STRICT_CONFIG", "1");
        std::env::set_var("BATCH_PROVIDER_API_KEY", "provider-key");
        std::env::set_var("INFERENCE_API_KEY", "inference-key");
        std::env::set_var("S3_ACCESS_KEY", "access");
        std::env::set_var("S3_SECRET_KEY", "secret");
        std::env::remove_var("OPERATOR_SECRET");

        let result = Settings::load();
        test_support::set_test_env();

        assert!(matches!(result, Err(ConfigError::MissingSecret("OPERATOR_SECRET"))));
    }
}
