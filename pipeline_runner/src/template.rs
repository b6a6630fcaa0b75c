use std::fs::File;
use std::io::Write;
use std::path::Path;

use anyhow::Result;

use crate::manifest::Manifest;
use crate::parameters::Parameters;

/// Where the function bundle lives. Build rewrites Local to Remote when it
/// packages the template, the same hand-off `cloudformation package` does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodeLocation {
    Local(String),
    Remote { bucket: String, key: String },
}

pub fn build_template(
    parameters: &Parameters,
    manifest: &Manifest,
    code: &CodeLocation,
) -> String {
    let mut builder = String::new();

    // Setup the template
    builder.push_str(&format!(
        r#"---
AWSTemplateFormatVersion: 2010-09-09
Transform: AWS::Serverless-2016-10-31
Description: Serverless Hello Pipeline
Globals:
  Function:
    Timeout: {}
    MemorySize: {}"#,
        parameters.function_timeout, parameters.function_memory
    ));

    builder.push_str(
        "
Resources:",
    );

    // Execution role, basic logging only
    builder.push_str(&format!(
        r#"
  RoleHello:
    Type: AWS::IAM::Role
    Properties:
      RoleName: !Sub "iam-${{AWS::Region}}-{}-role"
      Path: /
      AssumeRolePolicyDocument:
        Version: 2012-10-17
        Statement:
          - Effect: Allow
            Principal:
              Service: lambda.amazonaws.com
            Action: sts:AssumeRole
      ManagedPolicyArns: [arn:aws:iam::aws:policy/service-role/AWSLambdaBasicExecutionRole]"#,
        parameters.function_name
    ));

    // The endpoint function
    builder.push_str(&format!(
        r#"
  LambdaHello:
    Type: AWS::Serverless::Function
    Properties:
      FunctionName: {}
      Description: Hello Pipeline | {}
      Runtime: {}
      Architectures: [{}]
      Handler: {}
      Role: !GetAtt RoleHello.Arn"#,
        parameters.function_name,
        manifest.display_name,
        manifest.runtime,
        manifest.architectures.join(", "),
        manifest.handler
    ));

    match code {
        CodeLocation::Local(path) => {
            builder.push_str(&format!(
                r#"
      CodeUri: {path}"#
            ));
        }
        CodeLocation::Remote { bucket, key } => {
            builder.push_str(&format!(
                r#"
      CodeUri:
        Bucket: {bucket}
        Key: {key}"#
            ));
        }
    }

    builder.push_str(
        r#"
      Events:
        Hello:
          Type: Api
          Properties:
            Path: /hello
            Method: get"#,
    );

    builder.push_str(&format!(
        r#"
  LogsHello:
    Type: AWS::Logs::LogGroup
    Properties:
      LogGroupName: /aws/lambda/{}
      RetentionInDays: {}
"#,
        parameters.function_name, parameters.log_retention_in_days
    ));

    builder
}

pub fn create_template_file(path: &Path, content: &str) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(content.as_bytes())?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parameters() -> Parameters {
        Parameters {
            stack_name: "hello-pipeline".to_string(),
            function_name: "hello-pipeline-endpoint".to_string(),
            artifact_prefix: "artifacts".to_string(),
            log_retention_in_days: 7,
            function_memory: 128,
            function_timeout: 10,
        }
    }

    fn manifest() -> Manifest {
        Manifest {
            display_name: "hello".to_string(),
            runtime: "provided.al2".to_string(),
            handler: "bootstrap".to_string(),
            path: "hello_lambda".to_string(),
            architectures: vec!["x86_64".to_string()],
        }
    }

    #[test]
    fn template_carries_the_serverless_transform() {
        let template = build_template(
            &parameters(),
            &manifest(),
            &CodeLocation::Local("dist/function.zip".to_string()),
        );

        assert!(template.contains("Transform: AWS::Serverless-2016-10-31"));
        assert!(template.contains("Runtime: provided.al2"));
        assert!(template.contains("Handler: bootstrap"));
        assert!(template.contains("FunctionName: hello-pipeline-endpoint"));
        assert!(template.contains("RetentionInDays: 7"));
    }

    #[test]
    fn local_code_uri_points_at_the_bundle() {
        let template = build_template(
            &parameters(),
            &manifest(),
            &CodeLocation::Local("dist/function.zip".to_string()),
        );

        assert!(template.contains("CodeUri: dist/function.zip"));
    }

    #[test]
    fn packaged_code_uri_points_at_the_uploaded_object() {
        let template = build_template(
            &parameters(),
            &manifest(),
            &CodeLocation::Remote {
                bucket: "artifact-bucket".to_string(),
                key: "artifacts/run-1/function.zip".to_string(),
            },
        );

        assert!(template.contains("Bucket: artifact-bucket"));
        assert!(template.contains("Key: artifacts/run-1/function.zip"));
        assert!(!template.contains("CodeUri: dist/function.zip"));
    }

    #[test]
    fn route_is_the_single_hello_endpoint() {
        let template = build_template(
            &parameters(),
            &manifest(),
            &CodeLocation::Local("dist/function.zip".to_string()),
        );

        assert!(template.contains("Path: /hello"));
        assert!(template.contains("Method: get"));
    }
}
