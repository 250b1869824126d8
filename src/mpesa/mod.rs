//! Mobile-money payment network integration.

pub mod client;

pub use client::MpesaClient;

pub const CALLBACK_PREFIX: &str = "/mpesa";

/// Path the network posts results to for a routing module, e.g. `/mpesa/goals`.
pub fn callback_path(module: &str) -> String {
    format!("{}/{}", CALLBACK_PREFIX, module)
}

pub fn callback_url(base_url: &str, module: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), callback_path(module))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_callback_url_from_base() {
        assert_eq!(
            callback_url("https://pesa.example.com/", "goals"),
            "https://pesa.example.com/mpesa/goals"
        );
        assert_eq!(callback_path("budget"), "/mpesa/budget");
    }
}
