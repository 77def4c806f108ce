// Application state management
use std::path::PathBuf;

use crate::audio::NativePlayerFactory;
use crate::playback::MediaController;
use crate::settings::PlayerSettings;

pub struct AppState {
    pub controller: MediaController<NativePlayerFactory>,
    pub settings: PlayerSettings,
    pub app_dir: PathBuf,
}

impl AppState {
    pub fn new(
        controller: MediaController<NativePlayerFactory>,
        settings: PlayerSettings,
        app_dir: PathBuf,
    ) -> Self {
        Self {
            controller,
            settings,
            app_dir,
        }
    }
}
