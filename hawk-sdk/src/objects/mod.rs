pub mod contract;
pub mod gateway;
pub mod onboarding;
pub mod trade;
pub mod ws;

pub use contract::{ContractDetected, Delivery};
pub use onboarding::{
    ConnectApiRequest, ConnectApiResponse, UserProfile, VerifyCodeRequest, VerifyCodeResponse,
    VerifyPasswordRequest,
};
pub use trade::TradeRequest;
