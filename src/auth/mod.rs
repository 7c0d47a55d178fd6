//! Authentication module
//! 只校验外部身份服务签发的令牌，不签发会话

pub mod jwt;
pub mod middleware;

pub use jwt::{Claims, JwtVerifier};
pub use middleware::{extract_token, jwt_auth_middleware, verify_cron_key, AuthContext};
