pub mod settings_cache;
