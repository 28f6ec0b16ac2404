//! Gateway error types.

use std::fmt;
use thiserror::Error;

/// Step of the gateway conversation an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStep {
    Login,
    OpenDraft,
    InsertProduct,
    ValidateLot,
    Launch,
    Logout,
}

impl OrderStep {
    /// ERP service behind this step.
    pub fn service_name(&self) -> &'static str {
        match self {
            Self::Login => "MobileLoginSP.login",
            Self::OpenDraft => "LancamentoOrdemProducaoSP.getNovoLancamentoOP",
            Self::InsertProduct => "LancamentoOrdemProducaoSP.inserirProdutoHTML5",
            Self::ValidateLot => "LancamentoOrdemProducaoSP.validarTamanhoLote",
            Self::Launch => "LancamentoOrdemProducaoSP.lancarOrdensDeProducao",
            Self::Logout => "MobileLoginSP.logout",
        }
    }
}

impl fmt::Display for OrderStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Login => "login",
            Self::OpenDraft => "draft creation",
            Self::InsertProduct => "product insertion",
            Self::ValidateLot => "lot validation",
            Self::Launch => "order launch",
            Self::Logout => "logout",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Missing Sankhya credentials: {0}")]
    MissingCredentials(String),

    #[error("No active ERP session")]
    NotAuthenticated,

    /// The ERP answered and said no. Displays the ERP's own status message.
    #[error("{message}")]
    Rejected { step: OrderStep, message: String },

    /// Detail is for logs; the display message stays generic.
    #[error("Communication failure with the ERP during {step}")]
    Transport { step: OrderStep, detail: String },

    #[error("ERP did not answer {step} within {timeout_ms}ms")]
    Timeout { step: OrderStep, timeout_ms: u64 },

    #[error("Unexpected ERP response during {step}: {detail}")]
    Malformed { step: OrderStep, detail: String },

    #[error("HTTP client error: {0}")]
    HttpClient(String),
}

impl GatewayError {
    /// Step that failed, when the error came from a gateway call.
    pub fn step(&self) -> Option<OrderStep> {
        match self {
            Self::Rejected { step, .. }
            | Self::Transport { step, .. }
            | Self::Timeout { step, .. }
            | Self::Malformed { step, .. } => Some(*step),
            Self::MissingCredentials(_) | Self::NotAuthenticated | Self::HttpClient(_) => None,
        }
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
