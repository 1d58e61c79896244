use std::{fs, path::PathBuf};

use ts_rs::TS;

fn generate_types_content() -> String {
    let header = "// This file was generated by `cargo run --bin generate_types`.\n// Do not edit this file manually.\n";
    let decls = [
        preview::protocol::ElementAttributes::decl(),
        preview::protocol::ElementSelected::decl(),
        preview::protocol::ElementUpdated::decl(),
        preview::protocol::UpdateElement::decl(),
        preview::protocol::HostMessage::decl(),
        preview::protocol::SandboxMessage::decl(),
        preview::host::SelectedElement::decl(),
        preview::host::PropertySurface::decl(),
        db::models::user::User::decl(),
        db::models::project::Project::decl(),
        db::models::project::CreateProject::decl(),
        db::models::project::ProjectWithCode::decl(),
        db::models::frame::Frame::decl(),
        db::models::chat::ChatRole::decl(),
        db::models::chat::Chat::decl(),
        db::models::payment_order::PaymentStatus::decl(),
        services::services::credits::CreditDecision::decl(),
        services::services::copywriting::GeneratedImage::decl(),
        services::services::payments::VerifiedPayment::decl(),
        server::routes::generate::GenerateRequest::decl(),
        server::routes::credits::CreditsResponse::decl(),
        server::routes::projects::CreateProjectResponse::decl(),
        server::routes::projects::SaveCodeRequest::decl(),
        server::routes::projects::ApplyEditsRequest::decl(),
        server::routes::projects::ApplyEditsResponse::decl(),
        server::routes::projects::CreateMessageRequest::decl(),
        server::routes::ai::RewriteRequest::decl(),
        server::routes::ai::RewriteResponse::decl(),
        server::routes::ai::PromptRequest::decl(),
        server::routes::ai::EnhancePromptResponse::decl(),
        server::routes::payments::VerifyPaymentRequest::decl(),
        utils::response::ApiResponse::<()>::decl(),
    ];

    let body = decls
        .into_iter()
        .map(|decl| format!("export {decl}"))
        .collect::<Vec<_>>()
        .join("\n\n");
    format!("{header}\n{body}\n")
}

fn main() -> std::io::Result<()> {
    let check = std::env::args().any(|arg| arg == "--check");
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../shared/types.ts");
    let generated = generate_types_content();

    if check {
        let current = fs::read_to_string(&path).unwrap_or_default();
        if current == generated {
            println!("shared/types.ts is up to date.");
            return Ok(());
        }
        eprintln!("shared/types.ts is out of date; run `cargo run --bin generate_types`.");
        std::process::exit(1);
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(&path, generated)?;
    println!("Wrote {}", path.display());
    Ok(())
}
