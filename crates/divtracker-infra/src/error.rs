use snafu::prelude::*;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("{source}"))]
    Synth { source: synth::Error },

    #[snafu(display("Could not read profile {path:?}: {source}"))]
    ReadProfile {
        path: std::path::PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("Could not parse profile {path:?}: {source}"))]
    ParseProfile {
        path: std::path::PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("'{cidr}' is not an IPv4 CIDR block"))]
    InvalidCidr { cidr: String },

    #[snafu(display("{cidr} has no room for {count} subnets of prefix /{prefix}"))]
    CidrExhausted {
        cidr: String,
        count: usize,
        prefix: u8,
    },

    #[snafu(display("Platform option {namespace}:{option_name} is set more than once"))]
    DuplicateOption {
        namespace: String,
        option_name: String,
    },

    #[snafu(display("Only one secret key can be generated, got {}", keys.join(", ")))]
    MultipleGenerated { keys: Vec<String> },

    #[snafu(display("{source}"))]
    Deploy { source: anyhow::Error },
}

impl From<synth::Error> for Error {
    fn from(source: synth::Error) -> Self {
        Error::Synth { source }
    }
}

impl From<anyhow::Error> for Error {
    fn from(source: anyhow::Error) -> Self {
        Error::Deploy { source }
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;
