use crate::{error::CliResult, orthanc::OrthancClient, output::Output};

pub fn handle(client: &OrthancClient, output: Output) -> CliResult<()> {
    let info = client.system()?;

    if output.is_json() {
        return output.json(&info);
    }

    println!("Orthanc System Information");
    println!("==========================\n");
    println!("Server Name:         {}", info.name);
    println!("Version:             {}", info.version);
    println!("API Version:         {}", info.api_version);
    println!("URL:                 {}\n", client.base_url());

    println!("Network:");
    println!("  HTTP Port:         {}", info.http_port);
    println!("  DICOM AET:         {}", info.dicom_aet);
    println!("  DICOM Port:        {}\n", info.dicom_port);

    println!("Database:");
    println!("  Database Version:  {}", info.database_version);
    match info.database_backend_plugin.as_deref().filter(|p| !p.is_empty()) {
        Some(plugin) => println!("  Backend Plugin:    {plugin}"),
        None => println!("  Backend:           SQLite (built-in)"),
    }
    println!();

    println!("Storage:");
    match info.storage_area_plugin.as_deref().filter(|p| !p.is_empty()) {
        Some(plugin) => println!("  Storage Plugin:    {plugin}"),
        None => println!("  Storage:           File system (built-in)"),
    }
    if info.maximum_storage_size > 0 {
        println!("  Maximum Size:      {} MB", info.maximum_storage_size);
    }
    println!();

    println!("Plugins enabled:     {}", info.plugins_enabled);
    println!("Check revisions:     {}", info.check_revisions);
    Ok(())
}
