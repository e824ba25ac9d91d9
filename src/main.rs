fn main() -> anyhow::Result<()> {
    alertsync::cli::run()
}
