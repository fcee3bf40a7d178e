fn main() {
    formstack::run();
}
