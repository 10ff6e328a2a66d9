use regex::Regex;
use std::{
    collections::btree_map::BTreeMap,
    fs,
    path::{Component, Path, PathBuf, MAIN_SEPARATOR, MAIN_SEPARATOR_STR},
};
use tracing::{debug, debug_span};
use walkdir::WalkDir;

use crate::{
    annotation::{parse_provides, parse_requires, Provides},
    errors::{AnnotationErrorKind, DiscoveryErrorKind, LoadErrorKind},
    instantiator::Factory,
    registry::{ProviderRecord, Registry},
};

const COMMENT_PREFIXES: [&str; 7] = ["///", "//!", "//", "/**", "/*", "*", "#"];
const ANNOTATION_PATTERN: &str = r"^@(provides|requires)\b\s*(.*)$";
const DECLARATION_PATTERN: &str =
    r"^\s*(?:pub(?:\([^)]*\))?\s+|export\s+(?:default\s+)?)?(?:const\s+)?(?:async\s+)?(?:unsafe\s+)?(?:fn|function)\s+([A-Za-z_$][A-Za-z0-9_$]*)";

/// Normalizes `root` lexically: `.` components are removed, `..` components are folded
/// into their parent and a trailing separator is appended.
#[must_use]
pub fn normalize_root(root: impl AsRef<Path>) -> PathBuf {
    let mut components: Vec<Component<'_>> = Vec::new();

    for component in root.as_ref().components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match components.last() {
                Some(Component::Normal(_)) => {
                    components.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                _ => components.push(component),
            },
            component => components.push(component),
        }
    }

    let normalized = if components.is_empty() {
        PathBuf::from(".")
    } else {
        components.iter().collect()
    };

    let mut normalized = normalized.into_os_string();
    if !normalized.to_string_lossy().ends_with(MAIN_SEPARATOR) {
        normalized.push(MAIN_SEPARATOR_STR);
    }
    normalized.into()
}

/// Where a provider function is declared
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub path: PathBuf,
    /// 1-based line of the function declaration
    pub line: usize,
}

/// An annotated provider function found by [`Discovery`]
#[derive(Debug, Clone)]
pub struct Declaration {
    pub location: SourceLocation,
    /// Dotted path of the source file relative to its root, without the extension
    pub module: String,
    pub function: String,
    pub provides: Provides,
    pub requires: Vec<String>,
}

impl Declaration {
    /// `<module>.<function>`
    #[must_use]
    pub fn default_name(&self) -> String {
        format!("{}.{}", self.module, self.function)
    }

    /// Name the provider is registered under
    #[must_use]
    pub fn name(&self) -> String {
        match self.provides.name.as_deref() {
            Some(name) if !name.is_empty() => name.to_owned(),
            _ => self.default_name(),
        }
    }
}

/// Turns a declaration into the factory of its provider
pub trait Loader {
    /// # Errors
    /// Returns [`LoadErrorKind`] if the declared function can't be resolved to a factory
    fn load(&self, declaration: &Declaration) -> Result<Factory, LoadErrorKind>;
}

impl<F> Loader for F
where
    F: Fn(&Declaration) -> Result<Factory, LoadErrorKind>,
{
    fn load(&self, declaration: &Declaration) -> Result<Factory, LoadErrorKind> {
        self(declaration)
    }
}

/// In-memory [`Loader`] keyed by `<module>.<function>`
#[derive(Default, Clone)]
pub struct Catalog {
    factories: BTreeMap<String, Factory>,
}

impl Catalog {
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self { factories: BTreeMap::new() }
    }

    #[inline]
    #[must_use]
    pub fn insert(mut self, function: impl Into<String>, factory: Factory) -> Self {
        self.factories.insert(function.into(), factory);
        self
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }
}

impl Loader for Catalog {
    fn load(&self, declaration: &Declaration) -> Result<Factory, LoadErrorKind> {
        let function = declaration.default_name();
        let Some(factory) = self.factories.get(&function) else {
            return Err(LoadErrorKind::NotFound(function));
        };

        let declared = declaration.provides.calling_convention;
        let actual = factory.calling_convention();
        if !factory.is_literal_instance() && declared != actual {
            return Err(LoadErrorKind::ConventionMismatch { function, declared, actual });
        }

        Ok(factory.clone())
    }
}

/// Finds `@provides` and `@requires` annotated functions in the source files under a set of roots
#[derive(Debug, Clone)]
pub struct Discovery {
    roots: Vec<PathBuf>,
    extensions: Vec<String>,
}

impl Discovery {
    /// Scans files with the `rs` extension, see [`Discovery::with_extensions`]
    #[must_use]
    pub fn new<I, P>(roots: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            roots: roots.into_iter().map(normalize_root).collect(),
            extensions: vec!["rs".to_owned()],
        }
    }

    #[must_use]
    pub fn with_extensions<I, E>(mut self, extensions: I) -> Self
    where
        I: IntoIterator<Item = E>,
        E: Into<String>,
    {
        self.extensions = extensions.into_iter().map(Into::into).collect();
        self
    }

    /// Normalized roots, see [`normalize_root`]
    #[inline]
    #[must_use]
    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    /// Scans every root in order, and the files of a root in file name order
    ///
    /// # Errors
    /// - Returns [`DiscoveryErrorKind::Walk`] and [`DiscoveryErrorKind::Read`] if a root can't be read
    /// - Returns [`DiscoveryErrorKind::Annotation`] if an annotation is invalid or isn't followed by a function
    pub fn scan(&self) -> Result<Vec<Declaration>, DiscoveryErrorKind> {
        let scanner = Scanner::new()?;
        let mut declarations = Vec::new();

        for root in &self.roots {
            let _guard = debug_span!("scan", root = %root.display()).entered();
            let scanned = declarations.len();

            for entry in WalkDir::new(root).sort_by_file_name() {
                let entry = entry?;
                let path = entry.path();
                if !entry.file_type().is_file() || !self.has_extension(path) {
                    continue;
                }

                let source = fs::read_to_string(path).map_err(|source| DiscoveryErrorKind::Read {
                    path: path.to_owned(),
                    source,
                })?;
                let module = module_path(path.strip_prefix(root).unwrap_or(path));
                declarations.extend(scanner.scan(&module, path, &source)?);
            }

            debug!(count = declarations.len() - scanned, "Root scanned");
        }

        Ok(declarations)
    }

    /// Scans the text of a single source file as if it was found under a root
    ///
    /// # Errors
    /// Returns [`DiscoveryErrorKind::Annotation`] if an annotation is invalid or isn't followed by a function
    pub fn scan_source(&self, module: &str, path: &Path, source: &str) -> Result<Vec<Declaration>, DiscoveryErrorKind> {
        Scanner::new()?.scan(module, path, source)
    }

    fn has_extension(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| self.extensions.iter().any(|expected| expected == extension))
    }
}

impl Registry {
    /// Registers a provider for every declaration found by `discovery`, loading factories with `loader`.
    ///
    /// A declared name that is already registered replaces the previous record.
    ///
    /// # Errors
    /// - Returns the errors of [`Discovery::scan`]
    /// - Returns [`DiscoveryErrorKind::Load`] if `loader` fails to load a declaration
    pub fn discover(mut self, discovery: &Discovery, loader: &impl Loader) -> Result<Self, DiscoveryErrorKind> {
        for declaration in discovery.scan()? {
            let name = declaration.name();
            let factory = loader
                .load(&declaration)
                .map_err(|source| DiscoveryErrorKind::Load { name: name.clone(), source })?;

            debug!(name = %name, function = %declaration.function, "Provider discovered");
            self.register(ProviderRecord::new(name, factory, declaration.provides.scope, declaration.requires));
        }
        Ok(self)
    }
}

/// `services/db.rs` -> `services.db`
fn module_path(relative: &Path) -> String {
    relative
        .with_extension("")
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join(".")
}

fn comment_text(line: &str) -> Option<&str> {
    let line = line.trim();
    let text = COMMENT_PREFIXES.iter().find_map(|prefix| line.strip_prefix(prefix))?;
    Some(text.trim().trim_end_matches("*/").trim_end())
}

/// Annotations collected from the comments above a declaration
struct Annotated {
    line: usize,
    provides: Option<Provides>,
    requires: Vec<String>,
}

struct Scanner {
    annotation: Regex,
    declaration: Regex,
}

impl Scanner {
    fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            annotation: Regex::new(ANNOTATION_PATTERN)?,
            declaration: Regex::new(DECLARATION_PATTERN)?,
        })
    }

    fn scan(&self, module: &str, path: &Path, source: &str) -> Result<Vec<Declaration>, DiscoveryErrorKind> {
        let annotation_error = |line, source| DiscoveryErrorKind::Annotation {
            path: path.to_owned(),
            line,
            source,
        };
        let mut declarations = Vec::new();
        let mut pending: Option<Annotated> = None;

        for (index, line) in source.lines().enumerate() {
            let number = index + 1;

            if let Some(text) = comment_text(line) {
                if let Some(captures) = self.annotation.captures(text) {
                    let annotated = pending.get_or_insert_with(|| Annotated {
                        line: number,
                        provides: None,
                        requires: Vec::new(),
                    });
                    let body = captures.get(2).map_or("", |body| body.as_str());

                    if &captures[1] == "provides" {
                        annotated.provides = Some(parse_provides(body).map_err(|err| annotation_error(number, err))?);
                    } else {
                        annotated.requires.extend(parse_requires(body).map_err(|err| annotation_error(number, err))?);
                    }
                }
                continue;
            }
            if line.trim().is_empty() {
                continue;
            }

            let Some(annotated) = pending.take() else {
                continue;
            };
            let Some(captures) = self.declaration.captures(line) else {
                return Err(annotation_error(annotated.line, AnnotationErrorKind::Dangling));
            };

            declarations.push(Declaration {
                location: SourceLocation {
                    path: path.to_owned(),
                    line: number,
                },
                module: module.to_owned(),
                function: captures[1].to_owned(),
                provides: annotated.provides.unwrap_or_default(),
                requires: annotated.requires,
            });
        }

        if let Some(annotated) = pending {
            return Err(annotation_error(annotated.line, AnnotationErrorKind::Dangling));
        }
        Ok(declarations)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::{Path, PathBuf, MAIN_SEPARATOR},
    };
    use tracing_test::traced_test;

    use super::{normalize_root, Catalog, Discovery};
    use crate::{
        container::Container,
        errors::{AnnotationErrorKind, DiscoveryErrorKind, InstantiateErrorKind, LoadErrorKind},
        instantiator::{CallingConvention, Factory},
        registry::Registry,
        scope::Scope,
        Dependencies,
    };

    const DB_SOURCE: &str = r"
use std::sync::Arc;

/// Opens the connection pool
/// @provides 'database' scope='singleton', async='promise'
/// @requires ['services.db.config', 'services.db.config']
#[allow(dead_code)]
pub async fn connect(config: Arc<String>) {}

// @provides scope=prototype
fn config() {}

fn helper() {}
";

    fn fixture() -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("services")).unwrap();
        fs::write(dir.path().join("services").join("db.rs"), DB_SOURCE).unwrap();
        fs::write(dir.path().join("notes.txt"), "// @provides\nnot a function\n").unwrap();
        dir
    }

    #[test]
    fn test_normalize_root() {
        let sep = MAIN_SEPARATOR;

        assert_eq!(normalize_root("a/./b/../c"), PathBuf::from(format!("a{sep}c{sep}")));
        assert_eq!(normalize_root("a/b/"), PathBuf::from(format!("a{sep}b{sep}")));
        assert_eq!(normalize_root("../a"), PathBuf::from(format!("..{sep}a{sep}")));
        assert_eq!(normalize_root(""), PathBuf::from(format!(".{sep}")));
    }

    #[test]
    #[traced_test]
    fn test_scan() {
        let dir = fixture();
        let discovery = Discovery::new([dir.path()]);

        let declarations = discovery.scan().unwrap();

        assert_eq!(declarations.len(), 2);

        let connect = &declarations[0];
        assert_eq!(connect.module, "services.db");
        assert_eq!(connect.function, "connect");
        assert_eq!(connect.location.line, 8);
        assert_eq!(connect.name(), "database");
        assert_eq!(connect.default_name(), "services.db.connect");
        assert_eq!(connect.provides.calling_convention, CallingConvention::FutureReturning);
        assert_eq!(connect.requires, ["services.db.config", "services.db.config"]);

        let config = &declarations[1];
        assert_eq!(config.name(), "services.db.config");
        assert_eq!(config.provides.scope, Scope::Prototype);
        assert!(config.requires.is_empty());
    }

    #[test]
    fn test_dangling_annotation() {
        let discovery = Discovery::new(["."]);

        let err = discovery
            .scan_source("main", Path::new("main.rs"), "// @provides\nlet value = 1;\n")
            .unwrap_err();
        assert!(matches!(
            err,
            DiscoveryErrorKind::Annotation {
                line: 1,
                source: AnnotationErrorKind::Dangling,
                ..
            }
        ));

        let err = discovery
            .scan_source("main", Path::new("main.rs"), "fn main() {}\n# @requires config\n")
            .unwrap_err();
        assert!(matches!(err, DiscoveryErrorKind::Annotation { line: 2, .. }));

        let err = discovery
            .scan_source("main", Path::new("main.rs"), "// @provides scope='request'\nfn main() {}\n")
            .unwrap_err();
        assert!(matches!(
            err,
            DiscoveryErrorKind::Annotation {
                source: AnnotationErrorKind::InvalidScope(_),
                ..
            }
        ));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_discover_and_resolve() {
        let dir = fixture();
        let catalog = Catalog::new()
            .insert(
                "services.db.connect",
                Factory::future(|deps: Dependencies| async move {
                    let uri = deps.require::<String>(0)?;
                    Ok::<_, InstantiateErrorKind>(format!("Connection[{uri}]"))
                }),
            )
            .insert("services.db.config", Factory::instance(String::from("mongodb://foo")));

        let registry = Registry::new().discover(&Discovery::new([dir.path()]), &catalog).unwrap();
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup("services.db.config").unwrap().scope(), Scope::Prototype);

        let container = Container::new(registry);
        let connection = container.get_as::<String>("database").await.unwrap().unwrap();
        assert_eq!(connection.as_str(), "Connection[mongodb://foo]");
    }

    #[test]
    fn test_discover_load_errors() {
        let dir = fixture();
        let discovery = Discovery::new([dir.path()]);

        let mismatched = Catalog::new()
            .insert("services.db.connect", Factory::direct(|_| Ok::<_, InstantiateErrorKind>(())))
            .insert("services.db.config", Factory::instance(()));
        match Registry::new().discover(&discovery, &mismatched) {
            Err(DiscoveryErrorKind::Load {
                name,
                source: LoadErrorKind::ConventionMismatch { declared, actual, .. },
            }) => {
                assert_eq!(name, "database");
                assert_eq!(declared, CallingConvention::FutureReturning);
                assert_eq!(actual, CallingConvention::Direct);
            }
            _ => panic!("expected a convention mismatch"),
        }

        let missing = |_: &super::Declaration| -> Result<Factory, LoadErrorKind> { Err(LoadErrorKind::NotFound("connect".to_owned())) };
        assert!(matches!(
            Registry::new().discover(&discovery, &missing),
            Err(DiscoveryErrorKind::Load {
                source: LoadErrorKind::NotFound(_),
                ..
            })
        ));
    }
}
