use async_trait::async_trait;

/// 需要用户拍板的地方（轮末继续、导入覆盖、删除错题）都走这里。
#[async_trait]
pub trait Confirm: Send + Sync {
    async fn confirm(&self, message: &str) -> bool;

    async fn notify(&self, message: &str) {
        log::info!("{message}");
    }
}

/// 固定回答，用于 `--yes` 和测试。
#[derive(Debug, Clone, Copy)]
pub struct AutoConfirm(pub bool);

#[async_trait]
impl Confirm for AutoConfirm {
    async fn confirm(&self, message: &str) -> bool {
        log::debug!("自动确认 ({}): {message}", self.0);
        self.0
    }
}
