//! 请求级用户上下文

/// 当前请求的用户身份
///
/// 由外层认证逻辑构造后显式传入服务方法，服务内部不持有任何线程级状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserContext {
    user_id: i64,
}

impl UserContext {
    pub fn new(user_id: i64) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> i64 {
        self.user_id
    }
}
