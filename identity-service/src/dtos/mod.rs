pub mod auth;

pub use auth::{
    ConfirmRequest, ForgotPasswordRequest, LoginRequest, RefreshRequest, RefreshResponse,
    RegisterRequest, RegisterResponse, ResendCodeRequest, ResetPasswordRequest, SessionResponse,
    TherapistStatusResponse, TokenBundle,
};
