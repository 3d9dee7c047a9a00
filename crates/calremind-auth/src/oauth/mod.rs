pub mod google;
pub mod server;

pub use google::{
    build_authorize_url, exchange_code_for_tokens, generate_pkce_pair, open_authorize_url,
    refresh_access_token, run_installed_app_flow, GoogleTokenResponse, PkcePair,
    CALENDAR_READONLY_SCOPE,
};
pub use server::{wait_for_oauth_callback, OAuthCallback, OAUTH_CALLBACK_ADDR, OAUTH_CALLBACK_PATH};
