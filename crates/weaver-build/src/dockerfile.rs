//! 言語指定から Dockerfile を生成

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// イメージビルドの入力
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageSpec {
    pub language: String,
    /// CMD の上書き（None の場合は言語ごとのデフォルト）
    pub command: Option<String>,
    pub environment: HashMap<String, String>,
}

impl LanguageSpec {
    pub fn new(language: impl Into<String>) -> Self {
        Self {
            language: language.into(),
            ..Default::default()
        }
    }

    /// 空文字のコマンドは未指定として扱う
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        let command = command.into();
        self.command = (!command.trim().is_empty()).then_some(command);
        self
    }

    pub fn with_environment(mut self, environment: HashMap<String, String>) -> Self {
        self.environment = environment;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Runtime {
    Python,
    Node,
    Go,
    Java,
    Generic,
}

impl Runtime {
    fn detect(language: &str) -> Self {
        match language.to_lowercase().as_str() {
            "python" => Runtime::Python,
            "node" | "nodejs" | "javascript" => Runtime::Node,
            "go" | "golang" => Runtime::Go,
            "java" => Runtime::Java,
            _ => Runtime::Generic,
        }
    }

    fn base_image(&self) -> &'static str {
        match self {
            Runtime::Python => "python:3.11-slim",
            Runtime::Node => "node:18-slim",
            Runtime::Go => "golang:1.21-alpine",
            Runtime::Java => "openjdk:17-jre-slim",
            Runtime::Generic => "ubuntu:22.04",
        }
    }
}

const PYTHON_APP: &str = r#"RUN echo 'import http.server, socketserver, os; PORT = int(os.environ.get("PORT", 8000)); httpd = socketserver.TCPServer(("", PORT), http.server.SimpleHTTPRequestHandler); print(f"Server running on port {PORT}"); httpd.serve_forever()' > app.py"#;

const NODE_APP: &str = r#"RUN echo 'const http = require("http"); const port = process.env.PORT || 3000; http.createServer((req, res) => { res.writeHead(200, {"Content-Type": "text/html"}); res.end("<h1>Hello from Node.js!</h1>"); }).listen(port, () => console.log(`Server running on port ${port}`));' > app.js"#;

const SHELL_APP: &str = r#"RUN printf '#!/bin/sh\necho "Hello from Weaver!"\nwhile true; do sleep 1; done\n' > start.sh && chmod +x start.sh"#;

/// Dockerfile の内容を生成
///
/// 環境変数はキー順に並べ、値はダブルクォートで囲む。
pub fn generate_dockerfile(spec: &LanguageSpec) -> String {
    let runtime = Runtime::detect(&spec.language);
    let mut lines = vec![format!("FROM {}", runtime.base_image())];

    if runtime == Runtime::Generic {
        lines.push("RUN apt-get update && apt-get install -y curl wget".to_string());
    }
    lines.push("WORKDIR /app".to_string());

    let mut keys: Vec<&String> = spec.environment.keys().collect();
    keys.sort();
    for key in keys {
        lines.push(format!(
            "ENV {}=\"{}\"",
            key,
            escape_env_value(&spec.environment[key])
        ));
    }

    let (app, expose, default_cmd) = match runtime {
        Runtime::Python => (PYTHON_APP, Some(8000), r#"["python", "app.py"]"#),
        Runtime::Node => (NODE_APP, Some(3000), r#"["node", "app.js"]"#),
        _ => (SHELL_APP, None, r#"["./start.sh"]"#),
    };
    lines.push(app.to_string());
    if let Some(port) = expose {
        lines.push(format!("EXPOSE {}", port));
    }

    match spec.command.as_deref() {
        Some(command) => lines.push(format!("CMD {}", command)),
        None => lines.push(format!("CMD {}", default_cmd)),
    }

    let mut dockerfile = lines.join("\n");
    dockerfile.push('\n');
    dockerfile
}

fn escape_env_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}
