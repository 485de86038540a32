mod settings;

pub use settings::{
    ApiConfig, BackgroundSettings, BoardApiSettings, DeliverySettings, DigestSettings,
    NetworkSettings, OtelConfig, ServerConfig, Settings, StorageSettings,
};
