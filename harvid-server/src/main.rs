use clap::Parser;
use harvid_server::{build_router, AppState, Config};
use tracing::info;

fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    harvid_util::log::init();
    harvid_core::init();

    let state = AppState::new(&config);
    let app = build_router(state);

    let rt = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let addr = config.listen.parse()?;
    rt.block_on(async move {
        info!(addr = %config.listen, docroot = %config.docroot.display(), "harvid-server listening");
        axum::Server::bind(&addr)
            .serve(app.into_make_service())
            .await
    })?;

    Ok(())
}
