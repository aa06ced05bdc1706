pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
	#[error("Invalid parameter: {message}")]
	InvalidParameter { message: String },
	#[error("Generation failed: {message}")]
	GenerationFailure { message: String },
	#[error("Request deadline exceeded before {stage}.")]
	PipelineTimeout { stage: String },
	#[error("Provider error: {message}")]
	Provider { message: String },
	#[error("Storage error: {message}")]
	Storage { message: String },
}
impl Error {
	/// Short apology suitable for showing to the person who asked.
	pub fn user_message(&self) -> &'static str {
		match self {
			Self::InvalidParameter { .. } =>
				"Sorry, I could not understand that request. Please check it and try again.",
			Self::GenerationFailure { .. } | Self::Provider { .. } | Self::Storage { .. } =>
				"Sorry, something went wrong while preparing your answer. Please try again.",
			Self::PipelineTimeout { .. } =>
				"Sorry, that took too long to answer. Please try again in a moment.",
		}
	}
}
impl From<atelier_providers::Error> for Error {
	fn from(err: atelier_providers::Error) -> Self {
		Self::Provider { message: err.to_string() }
	}
}

impl From<atelier_storage::Error> for Error {
	fn from(err: atelier_storage::Error) -> Self {
		match err {
			atelier_storage::Error::InvalidArgument(message) => Self::InvalidParameter { message },
			other => Self::Storage { message: other.to_string() },
		}
	}
}
