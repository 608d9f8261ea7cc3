use crate::{
    core::domain::{
        Environment, EnvironmentCatalog, ExecutionRequest, RunResult, Submission, SubmissionToken,
    },
    http::models::{EnvironmentDto, RunRequestDto, RunResponseDto, SubmissionDto},
};

impl From<EnvironmentDto> for Environment {
    fn from(dto: EnvironmentDto) -> Self {
        Self {
            id: dto.id,
            name: dto.name,
        }
    }
}

impl From<Vec<EnvironmentDto>> for EnvironmentCatalog {
    fn from(dtos: Vec<EnvironmentDto>) -> Self {
        Self::new(dtos.into_iter().map(Into::into).collect())
    }
}

impl From<(SubmissionToken, SubmissionDto)> for Submission {
    fn from((token, dto): (SubmissionToken, SubmissionDto)) -> Self {
        Self {
            token,
            status_code: dto.status,
            stdout: dto.stdout,
            stderr: dto.stderr,
            compile_output: dto.compile_output,
            // Some judges report fractional milliseconds.
            time_ms: dto
                .time_ms
                .filter(|ms| ms.is_finite() && *ms >= 0.0)
                .map(|ms| ms.round() as u64),
            memory_kb: dto.memory_kb,
        }
    }
}

/// Missing fields become empty strings; rejecting them is up to validation.
impl From<RunRequestDto> for ExecutionRequest {
    fn from(dto: RunRequestDto) -> Self {
        Self {
            language_key: dto.language_key.unwrap_or_default(),
            source_code: dto.source_code.unwrap_or_default(),
            stdin: dto.stdin.unwrap_or_default(),
        }
    }
}

impl From<(String, RunResult)> for RunResponseDto {
    fn from((language_key, result): (String, RunResult)) -> Self {
        Self {
            language_key,
            stdout_text: result.stdout_text,
            stderr_text: result.stderr_text,
            time_ms: result.time_ms,
            memory_kb: result.memory_kb,
            status_code: result.status_code,
        }
    }
}
