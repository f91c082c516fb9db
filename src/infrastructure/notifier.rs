//! Notice and navigation sinks

use std::sync::{Mutex, PoisonError};
use tracing::{error, info};

use crate::application::ports::{LoginRedirect, Navigator, Notice, NoticeLevel, Notifier};

fn log_notice(notice: &Notice) {
    match notice.level {
        NoticeLevel::Success => info!("✅ {}", notice.message),
        NoticeLevel::Info => info!("ℹ️ {}", notice.message),
        NoticeLevel::Error => error!("❌ {}", notice.message),
    }
}

/// Logs and keeps every notice until drained
#[derive(Debug, Default)]
pub struct BufferedNotifier {
    notices: Mutex<Vec<Notice>>,
}

impl BufferedNotifier {
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn drain(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl Notifier for BufferedNotifier {
    fn notify(&self, notice: Notice) {
        log_notice(&notice);
        self.notices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(notice);
    }
}

/// Records login redirects
#[derive(Debug, Default)]
pub struct BufferedNavigator {
    redirects: Mutex<Vec<LoginRedirect>>,
}

impl BufferedNavigator {
    pub fn redirects(&self) -> Vec<LoginRedirect> {
        self.redirects.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn last_redirect(&self) -> Option<LoginRedirect> {
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl Navigator for BufferedNavigator {
    fn redirect_to_login(&self, redirect: &LoginRedirect) {
        info!("🔒 Redirecting to {}?redirect={}", redirect.route, redirect.return_path);
        self.redirects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(redirect.clone());
    }
}
