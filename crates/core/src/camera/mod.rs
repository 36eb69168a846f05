//! Camera capability: permission state, access and frame metadata.

use serde::{Deserialize, Serialize};

use crate::{Result, ThereminError};

/// Host-reported camera permission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionState {
    Granted,
    Denied,
    Prompt,
}

const DENIED_NOTICE: &str = "カメラへのアクセスが拒否されています。\n\
ブラウザの設定でカメラへのアクセスを許可してください。\n\
設定方法:\n\
1. ブラウザのアドレスバーの左側にあるカメラアイコンをクリック\n\
2. 「常に許可」を選択\n\
3. ページをリロード";

const PROMPT_NOTICE: &str = "アプリを開始すると、カメラへのアクセス許可を求められます。";

impl PermissionState {
    /// User-facing message for this state, if any should be shown.
    pub fn notice(self) -> Option<&'static str> {
        match self {
            Self::Denied => Some(DENIED_NOTICE),
            Self::Prompt => Some(PROMPT_NOTICE),
            Self::Granted => None,
        }
    }
}

/// Tracks the latest permission state and reports transitions.
#[derive(Debug, Clone)]
pub struct PermissionMonitor {
    state: PermissionState,
}

impl Default for PermissionMonitor {
    fn default() -> Self {
        Self {
            state: PermissionState::Prompt,
        }
    }
}

impl PermissionMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> PermissionState {
        self.state
    }

    /// Records a new state. Returns the state when it differs from the
    /// previous one so callers can refresh the notice.
    pub fn update(&mut self, state: PermissionState) -> Option<PermissionState> {
        if state == self.state {
            return None;
        }
        tracing::info!(from = ?self.state, to = ?state, "camera permission changed");
        self.state = state;
        Some(state)
    }

    /// Applies the outcome of a permission query. An unsupported query leaves
    /// the state as `Prompt` rather than blocking setup.
    pub fn observe_query(&mut self, result: Result<PermissionState>) -> PermissionState {
        match result {
            Ok(state) => {
                self.update(state);
            }
            Err(err) => {
                tracing::warn!(error = %err, "permission query is not supported");
                self.update(PermissionState::Prompt);
            }
        }
        self.state
    }

    pub fn notice(&self) -> Option<&'static str> {
        self.state.notice()
    }
}

/// Dimensions and capture time of the current camera frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraFrame {
    pub width: u32,
    pub height: u32,
    pub timestamp_ms: f64,
}

impl CameraFrame {
    pub fn area(&self) -> f64 {
        f64::from(self.width) * f64::from(self.height)
    }
}

/// Host media-capture facility.
pub trait CameraSource {
    /// Queries the permission without prompting. Errors mean the host has no
    /// permission API.
    fn query_permission(&mut self) -> Result<PermissionState>;

    /// Requests the stream, prompting the user if needed.
    fn request_access(&mut self) -> Result<()>;

    /// Frame at the given refresh timestamp, once access has been granted.
    fn frame_at(&self, timestamp_ms: f64) -> Option<CameraFrame>;
}

/// Camera stand-in with a fixed frame size and a scripted permission answer.
#[derive(Debug, Clone)]
pub struct ScriptedCamera {
    width: u32,
    height: u32,
    permission: Option<PermissionState>,
    granted: bool,
}

impl ScriptedCamera {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            permission: Some(PermissionState::Granted),
            granted: false,
        }
    }

    /// `None` simulates a host without a permission query API.
    pub fn with_permission(mut self, permission: Option<PermissionState>) -> Self {
        self.permission = permission;
        self
    }
}

impl CameraSource for ScriptedCamera {
    fn query_permission(&mut self) -> Result<PermissionState> {
        self.permission
            .ok_or_else(|| ThereminError::msg("permission query unsupported"))
    }

    fn request_access(&mut self) -> Result<()> {
        if self.permission == Some(PermissionState::Denied) {
            return Err(ThereminError::PermissionDenied);
        }
        self.granted = true;
        Ok(())
    }

    fn frame_at(&self, timestamp_ms: f64) -> Option<CameraFrame> {
        self.granted.then_some(CameraFrame {
            width: self.width,
            height: self.height,
            timestamp_ms,
        })
    }
}
