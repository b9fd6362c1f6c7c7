#[cfg(test)]
mod tests {
    use super::super::*;
    use futures::StreamExt;
    use serde_json::json;

    #[tokio::test]
    async fn test_production_manager_decodes_real_process() {
        let manager = SubprocessManager::production();
        let command = ProcessCommandBuilder::new("sh")
            .args(["-c", "echo '{\"hello\":\"world\"}'"])
            .build();

        let messages = manager
            .spawn_messages(command, &StreamingConfig::default())
            .await
            .unwrap()
            .collect_all()
            .await
            .unwrap();
        assert_eq!(messages, vec![json!({"hello": "world"})]);
    }

    #[tokio::test]
    async fn test_production_manager_command_not_found() {
        let manager = SubprocessManager::production();
        let command = ProcessCommandBuilder::new("nonexistent-command-12345").build();

        let err = manager
            .spawn_messages(command, &StreamingConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SpawnMessagesError::Process(ProcessError::CommandNotFound(_))
        ));
        assert_eq!(err.code(), crate::error::ErrorCode::EXEC_COMMAND_NOT_FOUND);
    }

    #[tokio::test]
    async fn test_suppressed_stderr_is_rejected() {
        let manager = SubprocessManager::production();
        let command = ProcessCommandBuilder::new("true").suppress_stderr().build();

        let err = manager
            .spawn_messages(command, &StreamingConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SpawnMessagesError::Stream(StreamError::ConnectionNotEstablished { .. })
        ));
    }

    #[tokio::test]
    async fn test_mock_manager_records_calls() {
        let (manager, mock) = SubprocessManager::mock();
        mock.expect_spawn(
            "claude",
            ScriptedProcess::new().chunks(["{\"type\":\"system\"}\n{\"type\":", "\"result\"}\n"]),
        );

        let command = ProcessCommandBuilder::new("claude")
            .args(["--output-format", "stream-json"])
            .build();
        let mut stream = manager
            .spawn_messages(command, &StreamingConfig::default())
            .await
            .unwrap();

        let mut types = Vec::new();
        while let Some(message) = stream.next().await {
            types.push(message.unwrap()["type"].clone());
        }
        assert_eq!(types, vec![json!("system"), json!("result")]);
        assert!(mock.verify_called("claude", 1));
        assert_eq!(
            mock.get_call_history()[0].args,
            vec!["--output-format", "stream-json"]
        );
    }

    #[tokio::test]
    async fn test_mock_manager_without_script() {
        let (manager, mock) = SubprocessManager::mock();
        let command = ProcessCommandBuilder::new("unknown").build();

        let err = manager
            .spawn_messages(command, &StreamingConfig::default())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SpawnMessagesError::Process(ProcessError::MockExpectationNotMet(_))
        ));
        assert!(mock.verify_called("unknown", 1));
    }
}
