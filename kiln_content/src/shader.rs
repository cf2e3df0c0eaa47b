mod lexer;

use std::{ffi::OsString, fs, path::Path};

use kiln_shared::{log::info, serde_json};
use serde::{Deserialize, Serialize};

use crate::{
    asset_processor::{ConvertContext, Converter},
    common::extract_extension_from_path,
    config::Config,
    meta::{self, Metadata},
    tool::Tool,
    Error, Result,
};

use self::lexer::{Lexer, Token};

/// Qualifiers that may appear between the storage qualifier and the type.
const PRECISION_QUALIFIERS: &[&str] = &["lowp", "mediump", "highp"];

/// Stage of a shader. It is stored in the metadata as `shader_type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShaderType {
    Misc,
    Vert,
    Frag,
    Tesc,
    Tese,
    Geom,
    Comp,
}

impl ShaderType {
    /// Determines the stage by the extension of the shader file.
    pub fn from_path(path: &Path) -> Option<Self> {
        match extract_extension_from_path(path)?.as_str() {
            "vert" => Some(ShaderType::Vert),
            "frag" => Some(ShaderType::Frag),
            "tesc" => Some(ShaderType::Tesc),
            "tese" => Some(ShaderType::Tese),
            "geom" => Some(ShaderType::Geom),
            "comp" => Some(ShaderType::Comp),
            "glsl" => Some(ShaderType::Misc),
            _ => None,
        }
    }
}

/// A `uniform`, `in` or `out` declaration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    #[serde(rename = "type")]
    pub ty: String,
    pub name: String,
}

impl Declaration {
    pub fn new(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            ty: ty.into(),
            name: name.into(),
        }
    }
}

/// Declarations at the global scope of a shader.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ShaderInterface {
    pub uniforms: Vec<Declaration>,
    pub in_attributes: Vec<Declaration>,
    pub out_attributes: Vec<Declaration>,
}

impl ShaderInterface {
    /// Collects the declarations from the given GLSL source.
    ///
    /// # Example
    ///
    /// ```rust
    /// use kiln_content::shader::{Declaration, ShaderInterface};
    /// let interface = ShaderInterface::parse("layout(location = 0) in vec3 aPos;\nuniform mat4 model;");
    /// assert_eq!(interface.in_attributes, vec![Declaration::new("vec3", "aPos")]);
    /// assert_eq!(interface.uniforms, vec![Declaration::new("mat4", "model")]);
    /// ```
    pub fn parse(source: &str) -> Self {
        let tokens = Lexer::new(source).collect::<Vec<_>>();
        let mut interface = ShaderInterface::default();
        let mut brace_depth = 0usize;
        let mut paren_depth = 0usize;
        for (index, token) in tokens.iter().enumerate() {
            match token {
                Token::Punctuation('{') => brace_depth += 1,
                Token::Punctuation('}') => brace_depth = brace_depth.saturating_sub(1),
                Token::Punctuation('(') => paren_depth += 1,
                Token::Punctuation(')') => paren_depth = paren_depth.saturating_sub(1),
                Token::Identifier(keyword) if brace_depth == 0 && paren_depth == 0 => {
                    let list = match *keyword {
                        "uniform" => &mut interface.uniforms,
                        "in" => &mut interface.in_attributes,
                        "out" => &mut interface.out_attributes,
                        _ => continue,
                    };
                    if let Some(declaration) = read_declaration(&tokens[index + 1..]) {
                        list.push(declaration);
                    }
                }
                _ => {}
            }
        }
        interface
    }
}

/// Reads the type and the name that follow a storage qualifier.
fn read_declaration(tokens: &[Token]) -> Option<Declaration> {
    let mut identifiers = tokens
        .iter()
        .map(|token| match token {
            Token::Identifier(identifier) => Some(*identifier),
            _ => None,
        })
        .skip_while(|identifier| identifier.map_or(false, |identifier| PRECISION_QUALIFIERS.contains(&identifier)));
    let ty = identifiers.next()??;
    let name = identifiers.next()??;
    Some(Declaration::new(ty, name))
}

/// Returns the version of a `#version` directive in the first line.
pub fn parse_glsl_version(source: &str) -> Option<String> {
    let first_line = source.lines().next()?;
    match Lexer::new(first_line).next()? {
        Token::Directive(directive) => {
            let mut parts = directive.split_whitespace();
            match (parts.next(), parts.next()) {
                (Some("version"), Some(version)) => Some(version.to_owned()),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Validates shaders with `glslangValidator` and records their interface in the metadata.
///
/// | Key              | Value                                 |
/// |------------------|---------------------------------------|
/// | `shader_type`    | Stage, kept when already present      |
/// | `glsl_version`   | Version of the `#version` directive   |
/// | `uniforms`       | List of `{"type", "name"}` objects    |
/// | `in_attributes`  | List of `{"type", "name"}` objects    |
/// | `out_attributes` | List of `{"type", "name"}` objects    |
pub struct ShaderConverter;

impl Converter for ShaderConverter {
    fn check_configuration(&self, config: &Config, _src: &Path) -> Result<()> {
        config.tool_path(Tool::GlslangValidator)?;
        Ok(())
    }

    fn convert(&self, context: &ConvertContext, src: &Path, dst: &Path, mut meta: Metadata) -> Result<Metadata> {
        info!("Validating shader '{}'", src.display());
        context.runner.run(Tool::GlslangValidator, &[OsString::from(src)])?;

        let shader_type = ShaderType::from_path(dst)
            .or_else(|| ShaderType::from_path(src))
            .unwrap_or(ShaderType::Misc);
        meta::setting(&mut meta, "shader_type", shader_type)?;

        let source = fs::read_to_string(src)?;
        if let Some(version) = parse_glsl_version(&source) {
            meta.insert("glsl_version".to_owned(), version.into());
        }

        let interface = ShaderInterface::parse(&source);
        let to_value = |declarations: &Vec<Declaration>| {
            serde_json::to_value(declarations).map_err(|err| Error::Other(Box::new(err)))
        };
        meta.insert("uniforms".to_owned(), to_value(&interface.uniforms)?);
        meta.insert("in_attributes".to_owned(), to_value(&interface.in_attributes)?);
        meta.insert("out_attributes".to_owned(), to_value(&interface.out_attributes)?);
        Ok(meta)
    }
}
