//! 会话监管：中断标志与取消令牌
//!
//! 每次运行开始时 renew 出一个新的 CancellationToken 交给执行器；interrupt 同时置位标志并取消当前令牌。
//! 标志在 reset 或下一次运行开始时清除。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio_util::sync::CancellationToken;

#[derive(Debug)]
pub struct SessionSupervisor {
    interrupted: AtomicBool,
    /// 当前运行的取消令牌
    cancel_token: Mutex<CancellationToken>,
}

impl SessionSupervisor {
    pub fn new() -> Self {
        Self {
            interrupted: AtomicBool::new(false),
            cancel_token: Mutex::new(CancellationToken::new()),
        }
    }

    /// 新运行开始：清除中断标志并换发令牌，返回令牌副本
    pub fn renew(&self) -> CancellationToken {
        self.interrupted.store(false, Ordering::SeqCst);
        let token = CancellationToken::new();
        let mut guard = self.cancel_token.lock().unwrap_or_else(|e| e.into_inner());
        *guard = token.clone();
        token
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// 触发中断（任意线程可调用）
    pub fn interrupt(&self) {
        self.interrupted.store(true, Ordering::SeqCst);
        self.cancel_token
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .cancel();
    }

    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.interrupted.store(false, Ordering::SeqCst);
    }
}

impl Default for SessionSupervisor {
    fn default() -> Self {
        Self::new()
    }
}
