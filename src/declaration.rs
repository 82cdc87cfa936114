//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了实体类型上的缓存声明以及声明的校验逻辑。
//!
//! 每个参与缓存的实体类型通过 [`ModelDescriptor`] 描述自己：要缓存哪些属性，
//! 以及哪些其他类型的变化会影响这些属性。

use crate::entity::EntityType;
use crate::error::{CacheError, Result};
use crate::registry::DependencyRule;
use crate::resolver::Resolver;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

/// 属性名允许的最大长度，与缓存表 `name` 列宽度一致
pub const MAX_PROPERTY_NAME_LEN: usize = 64;

/// 实体类型描述
///
/// 没有声明的类型在启动注册时会被跳过
#[derive(Clone, Debug)]
pub struct ModelDescriptor {
    pub entity_type: EntityType,
    pub declaration: Option<CacheDeclaration>,
}

impl ModelDescriptor {
    /// 不参与缓存的类型
    pub fn new(entity_type: impl Into<EntityType>) -> Self {
        Self {
            entity_type: entity_type.into(),
            declaration: None,
        }
    }

    pub fn with_declaration(mut self, declaration: CacheDeclaration) -> Self {
        self.declaration = Some(declaration);
        self
    }
}

/// 缓存声明
#[derive(Clone, Debug, Default)]
pub struct CacheDeclaration {
    /// 本类型需要缓存的属性，按声明顺序
    pub cached_properties: Vec<String>,
    /// 依赖其他类型的解析器
    pub resolvers: Vec<ResolverDescriptor>,
}

impl CacheDeclaration {
    pub fn new<I, S>(cached_properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            cached_properties: cached_properties.into_iter().map(Into::into).collect(),
            resolvers: Vec::new(),
        }
    }

    /// 追加一个解析器
    pub fn resolver(mut self, descriptor: ResolverDescriptor) -> Self {
        self.resolvers.push(descriptor);
        self
    }

    /// 校验声明并构造依赖规则
    ///
    /// 返回的第一条规则总是自身规则，其余按解析器声明顺序排列。
    /// 任何一处不合法都会使整个声明被拒绝
    pub fn build_rules(&self, target_type: &EntityType) -> Result<Vec<DependencyRule>> {
        let reject = |reason: String| CacheError::Declaration {
            entity_type: target_type.to_string(),
            reason,
        };

        let mut declared = HashSet::with_capacity(self.cached_properties.len());
        for name in &self.cached_properties {
            check_property_name(name).map_err(&reject)?;
            if !declared.insert(name.as_str()) {
                return Err(reject(format!("property '{}' is declared twice", name)));
            }
        }

        let mut rules = Vec::with_capacity(self.resolvers.len() + 1);
        rules.push(DependencyRule::self_rule(
            target_type.clone(),
            self.cached_properties.clone(),
        ));

        for descriptor in &self.resolvers {
            let label = descriptor.resolver.name();
            let source_type = descriptor
                .model
                .clone()
                .ok_or_else(|| reject(format!("resolver '{}' is missing `model`", label)))?;
            let properties = match &descriptor.properties {
                Some(properties) if !properties.is_empty() => properties.clone(),
                _ => {
                    return Err(reject(format!(
                        "resolver '{}' is missing `properties`",
                        label
                    )))
                }
            };

            if let Some(unknown) = properties
                .iter()
                .find(|p| !declared.contains(p.as_str()))
            {
                return Err(reject(format!(
                    "resolver '{}' maintains '{}', which is not a cached property",
                    label, unknown
                )));
            }

            rules.push(DependencyRule::new(
                target_type.clone(),
                source_type,
                descriptor.resolver.clone(),
                properties,
            ));
        }

        Ok(rules)
    }
}

fn check_property_name(name: &str) -> std::result::Result<(), String> {
    if name.is_empty() {
        return Err("property names cannot be empty".to_string());
    }
    if name.chars().count() > MAX_PROPERTY_NAME_LEN {
        return Err(format!(
            "property '{}' exceeds {} characters",
            name, MAX_PROPERTY_NAME_LEN
        ));
    }
    Ok(())
}

/// 解析器描述
///
/// `model` 与 `properties` 都是必填项，保留为 `Option` 以便在启动注册时
/// 以配置错误的形式报告缺失
#[derive(Clone)]
pub struct ResolverDescriptor {
    pub resolver: Arc<dyn Resolver>,
    pub model: Option<EntityType>,
    pub properties: Option<Vec<String>>,
}

impl ResolverDescriptor {
    pub fn new(resolver: Arc<dyn Resolver>) -> Self {
        Self {
            resolver,
            model: None,
            properties: None,
        }
    }

    /// 触发该解析器的源类型
    pub fn model(mut self, source_type: impl Into<EntityType>) -> Self {
        self.model = Some(source_type.into());
        self
    }

    /// 该解析器维护的属性
    pub fn properties<I, S>(mut self, properties: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.properties = Some(properties.into_iter().map(Into::into).collect());
        self
    }
}

impl fmt::Debug for ResolverDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolverDescriptor")
            .field("resolver", &self.resolver.name())
            .field("model", &self.model)
            .field("properties", &self.properties)
            .finish()
    }
}
