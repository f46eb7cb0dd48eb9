use canopy::config::{Fixture, FixtureError};
use canopy::move_session::MoveError;
use canopy::{ConflictResolver, FixedPolicy, NamespaceStore, NodeId};
use snafu::Snafu;
use snafu::prelude::*;
use supports_color::Stream;
use tracing::{debug, info};

use crate::application::RuntimeConfig;
use crate::application::prompt::PromptResolver;
use crate::application::runtime_config::MoveRequest;
use crate::application::tree_view::render_tree;

pub struct Application;

impl Application {
    pub async fn run(app_config: impl Into<RuntimeConfig>) -> Result<(), ApplicationError> {
        let app_config: RuntimeConfig = app_config.into();
        let fixture = Fixture::read(&app_config.fixture)
            .await
            .context(FixtureSnafu)?;
        debug!("Loaded fixture: {:?}", fixture);

        let mut store = NamespaceStore::new();
        fixture.populate(&mut store).context(FixtureSnafu)?;
        store.subscribe(|event| {
            info!(
                "{} operation {}, {} directorie(s) changed",
                event.operation.kind(),
                event.kind,
                event.scopes.len()
            );
        });

        if let Some(request) = &app_config.move_request {
            Self::run_move(&mut store, request, &app_config)?;
        }

        if app_config.undo {
            match store.undo_last_operation() {
                Some(kind) => println!("Undid {kind}"),
                None => println!("Nothing to undo"),
            }
        }

        if let Some(text) = &app_config.find {
            let needle = text.to_lowercase();
            let found = store.search(|node| node.name().to_lowercase().contains(&needle), None);
            println!("{} match(es) for '{}'", found.len(), text);
            for id in found {
                println!("  {}", store.full_path(id).unwrap_or_default());
            }
        }

        let use_color = supports_color::on(Stream::Stdout).is_some();
        print!("{}", render_tree(&store, use_color));
        Ok(())
    }

    fn run_move(
        store: &mut NamespaceStore,
        request: &MoveRequest,
        app_config: &RuntimeConfig,
    ) -> Result<(), ApplicationError> {
        let target = Self::resolve_path(store, &request.into)?;
        let sources = request
            .sources
            .iter()
            .map(|path| Self::resolve_path(store, path))
            .collect::<Result<Vec<_>, _>>()?;

        let mut resolver: Box<dyn ConflictResolver> = match app_config.on_conflict.to_resolution() {
            Some(resolution) => Box::new(FixedPolicy(resolution)),
            None => Box::new(PromptResolver::stdio()),
        };
        let report = store
            .move_nodes(&sources, target, resolver.as_mut())
            .context(MoveSnafu)?;

        match report {
            Some(report) => println!(
                "Moved {}, replaced {}, merged {}, skipped {}",
                report.moved, report.replaced, report.merged, report.skipped
            ),
            None => println!("Nothing was moved"),
        }
        Ok(())
    }

    fn resolve_path(store: &NamespaceStore, path: &str) -> Result<NodeId, ApplicationError> {
        store
            .lookup_path(path)
            .context(UnknownPathSnafu { path })
    }
}

#[derive(Debug, Snafu)]
pub enum ApplicationError {
    #[snafu(display("Critical failure encountered while loading the fixture"))]
    FixtureError { source: FixtureError },
    #[snafu(display("No node at '{}'", path))]
    UnknownPath { path: String },
    #[snafu(display("Critical failure encountered during the move"))]
    MoveError { source: MoveError },
}
