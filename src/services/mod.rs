pub(crate) mod documents;
pub(crate) mod model_output;
pub(crate) mod nim_client;
pub(crate) mod prompts;
