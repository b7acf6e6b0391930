pub mod model_metadata;
pub mod model_storage;
pub mod config;

pub use model_metadata::{ModelMetadata, INPUT_LAYER_NAME, OUTPUT_LAYER_NAME};
pub use model_storage::{save_model_with_metadata, load_metadata, load_model_with_metadata, print_metadata_info};
pub use config::{AppConfig, DeviceType, LossKind, DatasetSettings, ModelSettings, TrainingSettings, ImageSettings};
