use std::collections::BTreeMap;

/// Build context exposed to resource scripts as environment variables
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResourceMetadata {
    pub build_id: Option<i64>,
    pub build_name: String,
    pub job_name: String,
    pub pipeline_name: String,
    pub team_name: String,
    pub external_url: String,
}

impl ResourceMetadata {
    /// `BUILD_*` variables; empty fields are left out
    pub fn env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Some(build_id) = self.build_id {
            env.insert("BUILD_ID".to_string(), build_id.to_string());
        }
        for (name, value) in [
            ("BUILD_NAME", &self.build_name),
            ("BUILD_JOB_NAME", &self.job_name),
            ("BUILD_PIPELINE_NAME", &self.pipeline_name),
            ("BUILD_TEAM_NAME", &self.team_name),
            ("ATC_EXTERNAL_URL", &self.external_url),
        ] {
            if !value.is_empty() {
                env.insert(name.to_string(), value.clone());
            }
        }
        env
    }
}
