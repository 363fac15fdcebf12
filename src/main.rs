fn main() -> anyhow::Result<()> {
    glance::run()
}
